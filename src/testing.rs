//! In-memory stores and recorders used by unit and router tests.

use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::{
    error::AppError,
    mail::{EmailMessage, Mailer},
    storage::StorageClient,
    tours::{
        dto::CreateTourRequest,
        repo::TourStore,
        repo_types::{DifficultyStats, MonthlyPlan, SortField, SortKey, Tour},
    },
    users::{
        repo::UserStore,
        repo_types::{NewUser, ProfileUpdate, Role, User, DEFAULT_PHOTO},
    },
};

/// Placeholder hash for users that never log in with a password.
const UNUSABLE_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNoaGFzaA";

pub fn sample_user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        name: "Test User".into(),
        email: email.into(),
        photo: DEFAULT_PHOTO.into(),
        role: Role::User,
        password_hash: UNUSABLE_HASH.into(),
        password_changed_at: None,
        reset_token_hash: None,
        reset_token_expires_at: None,
        active: true,
        created_at: OffsetDateTime::now_utc(),
    }
}

pub fn sample_tour_request(name: &str, price: f64) -> CreateTourRequest {
    CreateTourRequest {
        name: Some(name.into()),
        price: Some(price),
        duration: Some(5),
        max_group_size: Some(25),
        difficulty: Some("easy".into()),
        summary: Some("Breathtaking hike through the Canadian Banff National Park".into()),
        image_cover: Some("tour-1-cover.jpg".into()),
        start_dates: Some(vec!["2021-04-25T09:00:00Z".into()]),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn insert(&self, user: User) -> User {
        self.users.lock().unwrap().insert(user.id, user.clone());
        user
    }

    /// Raw lookup, inactive users included.
    pub fn get(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    fn find_active(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.active && pred(u))
            .cloned()
    }

    fn with_user<T>(&self, id: Uuid, f: impl FnOnce(&mut User) -> T) -> Option<T> {
        self.users.lock().unwrap().get_mut(&id).map(f)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, new: &NewUser) -> Result<User, AppError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == new.email) {
            return Err(AppError::Conflict("This email is already registered".into()));
        }
        let mut user = sample_user(&new.email);
        user.name = new.name.clone();
        user.role = new.role;
        user.password_hash = new.password_hash.clone();
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.find_active(|u| u.id == id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.find_active(|u| u.email == email))
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> Result<Option<User>, AppError> {
        Ok(self.find_active(|u| {
            u.reset_token_hash.as_deref() == Some(token_hash)
                && u.reset_token_expires_at.map_or(false, |exp| exp > now)
        }))
    }

    async fn list_active(&self) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.active)
            .cloned()
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: Option<(String, OffsetDateTime)>,
    ) -> Result<(), AppError> {
        let (hash, expires) = token.unzip();
        self.with_user(id, |u| {
            u.reset_token_hash = hash;
            u.reset_token_expires_at = expires;
        });
        Ok(())
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), AppError> {
        self.with_user(id, |u| {
            u.password_hash = password_hash.to_string();
            u.password_changed_at = Some(changed_at);
            u.reset_token_hash = None;
            u.reset_token_expires_at = None;
        });
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, AppError> {
        let mut users = self.users.lock().unwrap();
        if let Some(email) = &update.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(AppError::Conflict("This email is already registered".into()));
            }
        }
        Ok(users.get_mut(&id).filter(|u| u.active).map(|u| {
            if let Some(name) = &update.name {
                u.name = name.clone();
            }
            if let Some(email) = &update.email {
                u.email = email.clone();
            }
            if let Some(photo) = &update.photo {
                u.photo = photo.clone();
            }
            u.clone()
        }))
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), AppError> {
        self.with_user(id, |u| u.active = false);
        Ok(())
    }
}

fn cmp_field(a: &Tour, b: &Tour, field: SortField) -> Ordering {
    let by_f64 = |x: f64, y: f64| x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::Price => by_f64(a.price, b.price),
        // Postgres puts NULLs last when ascending.
        SortField::PriceDiscount => match (a.price_discount, b.price_discount) {
            (Some(x), Some(y)) => by_f64(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortField::RatingsAverage => by_f64(a.ratings_average, b.ratings_average),
        SortField::RatingsQuantity => a.ratings_quantity.cmp(&b.ratings_quantity),
        SortField::Duration => a.duration.cmp(&b.duration),
        SortField::MaxGroupSize => a.max_group_size.cmp(&b.max_group_size),
        SortField::Difficulty => a.difficulty.cmp(&b.difficulty),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

#[derive(Default)]
pub struct MemoryTourStore {
    tours: Mutex<Vec<Tour>>,
}

impl MemoryTourStore {
    fn name_taken(tours: &[Tour], name: &str, except: Uuid) -> bool {
        tours.iter().any(|t| t.id != except && t.name == name)
    }
}

#[async_trait]
impl TourStore for MemoryTourStore {
    async fn count(&self) -> Result<i64, AppError> {
        Ok(self.tours.lock().unwrap().len() as i64)
    }

    async fn list(
        &self,
        sort: &[SortKey],
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Tour>, AppError> {
        let mut tours = self.tours.lock().unwrap().clone();
        tours.sort_by(|a, b| {
            sort.iter()
                .map(|k| {
                    let ord = cmp_field(a, b, k.field);
                    if k.descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                })
                .find(|o| o.is_ne())
                .unwrap_or_else(|| a.id.cmp(&b.id))
        });
        let take = limit.map_or(usize::MAX, |l| l.max(0) as usize);
        Ok(tours
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(take)
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Tour>, AppError> {
        Ok(self.tours.lock().unwrap().iter().find(|t| t.id == id).cloned())
    }

    async fn insert(&self, tour: &Tour) -> Result<Tour, AppError> {
        let mut tours = self.tours.lock().unwrap();
        if Self::name_taken(&tours, &tour.name, tour.id) {
            return Err(AppError::Conflict("A tour with this name already exists".into()));
        }
        tours.push(tour.clone());
        Ok(tour.clone())
    }

    async fn save(&self, tour: &Tour) -> Result<Option<Tour>, AppError> {
        let mut tours = self.tours.lock().unwrap();
        if Self::name_taken(&tours, &tour.name, tour.id) {
            return Err(AppError::Conflict("A tour with this name already exists".into()));
        }
        Ok(tours.iter_mut().find(|t| t.id == tour.id).map(|slot| {
            *slot = Tour {
                created_at: slot.created_at,
                ..tour.clone()
            };
            slot.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tours = self.tours.lock().unwrap();
        let before = tours.len();
        tours.retain(|t| t.id != id);
        Ok(tours.len() < before)
    }

    async fn stats(
        &self,
        min_rating: f64,
        min_max_price: f64,
    ) -> Result<Vec<DifficultyStats>, AppError> {
        let tours = self.tours.lock().unwrap();
        let mut groups: BTreeMap<&str, Vec<&Tour>> = BTreeMap::new();
        for t in tours.iter().filter(|t| t.ratings_average >= min_rating) {
            groups.entry(t.difficulty.as_str()).or_default().push(t);
        }

        let mut stats: Vec<DifficultyStats> = groups
            .into_iter()
            .map(|(difficulty, group)| {
                let n = group.len() as f64;
                let prices = group.iter().map(|t| t.price);
                DifficultyStats {
                    difficulty: difficulty.to_string(),
                    num_tours: group.len() as i64,
                    num_ratings: group.iter().map(|t| t.ratings_quantity as i64).sum(),
                    avg_rating: group.iter().map(|t| t.ratings_average).sum::<f64>() / n,
                    max_price: prices.clone().fold(f64::MIN, f64::max),
                    min_price: prices.clone().fold(f64::MAX, f64::min),
                    avg_price: prices.sum::<f64>() / n,
                }
            })
            .filter(|s| s.max_price >= min_max_price)
            .collect();
        stats.sort_by(|a, b| {
            a.num_tours.cmp(&b.num_tours).then(
                b.max_price
                    .partial_cmp(&a.max_price)
                    .unwrap_or(Ordering::Equal),
            )
        });
        Ok(stats)
    }

    async fn monthly_plan(&self, year: i32) -> Result<Vec<MonthlyPlan>, AppError> {
        let tours = self.tours.lock().unwrap();
        let mut months: BTreeMap<i32, Vec<String>> = BTreeMap::new();
        for t in tours.iter() {
            for d in &t.start_dates {
                let d = d.to_offset(UtcOffset::UTC);
                if d.year() == year {
                    months.entry(u8::from(d.month()) as i32).or_default().push(t.name.clone());
                }
            }
        }
        Ok(months
            .into_iter()
            .map(|(month, mut names)| {
                names.sort();
                MonthlyPlan {
                    month,
                    num_tours: names.len() as i64,
                    tours: names,
                }
            })
            .collect())
    }
}

/// Captures outgoing mail. A failing mailer errors on every send.
#[derive(Default)]
pub struct RecordingMailer {
    fail: bool,
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: EmailMessage) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("relay unavailable");
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingStorage {
    objects: Mutex<BTreeMap<String, Bytes>>,
}

impl RecordingStorage {
    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl StorageClient for RecordingStorage {
    async fn put_object(&self, key: &str, body: Bytes, _content_type: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Handles onto the fakes behind an `AppState::fake()`.
pub struct Fakes {
    pub users: Arc<MemoryUserStore>,
    pub tours: Arc<MemoryTourStore>,
    pub mailer: Arc<RecordingMailer>,
    pub storage: Arc<RecordingStorage>,
}
