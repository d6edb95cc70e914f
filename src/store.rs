//! Persistence of users, calendars and their notification state.

use crate::calendar::notified::NotifiedState;
use crate::calendar::{CalendarConfig, CalendarKey, UserConfig};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to (de)serialize the store: {0}")]
    Json(#[from] serde_json::Error),
    #[error("calendar {0} not found")]
    CalendarNotFound(CalendarKey),
    #[error("store lock is poisoned")]
    Poisoned,
}

/// Storage for users, calendars and their notification state.
///
/// Implementations serialize writes: the scheduled processing and user commands may touch the
/// same calendar concurrently.
pub trait Store: Send + Sync {
    /// All calendars of all users.
    fn all_calendars(&self) -> Result<Vec<CalendarConfig>, StoreError>;

    /// The calendars of a user, in the order they were added.
    fn user_calendars(&self, user_id: &str) -> Result<Vec<CalendarConfig>, StoreError>;

    fn load_calendar(&self, key: &CalendarKey) -> Result<CalendarConfig, StoreError>;

    /// Applies `update` to the stored calendar atomically and returns the result. Fails if the
    /// calendar doesn't exist (anymore).
    fn update_calendar(
        &self,
        key: &CalendarKey,
        update: &mut dyn FnMut(&mut CalendarConfig),
    ) -> Result<CalendarConfig, StoreError>;

    /// Adds a calendar for the user, assigning the next free id.
    fn add_calendar(
        &self,
        user_id: &str,
        url: &str,
        channel_id: &str,
    ) -> Result<CalendarConfig, StoreError>;

    /// Deletes the calendar together with its notification state.
    fn delete_calendar(&self, key: &CalendarKey) -> Result<(), StoreError>;

    fn load_events(&self, key: &CalendarKey) -> Result<NotifiedState, StoreError>;

    fn save_events(&self, key: &CalendarKey, state: &NotifiedState) -> Result<(), StoreError>;

    /// The user's settings, defaults for unknown users.
    fn load_user(&self, user_id: &str) -> Result<UserConfig, StoreError>;

    fn save_user(&self, user_id: &str, user: &UserConfig) -> Result<(), StoreError>;

    /// Overwrites an existing calendar.
    fn save_calendar(&self, calendar: &CalendarConfig) -> Result<(), StoreError> {
        self.update_calendar(&calendar.key(), &mut |stored| *stored = calendar.clone())
            .map(|_| ())
    }

    /// Enables or disables a calendar on user request. Enabling starts error counting afresh.
    fn set_enabled(&self, key: &CalendarKey, enabled: bool) -> Result<CalendarConfig, StoreError> {
        self.update_calendar(key, &mut |calendar| {
            calendar.enabled = enabled;
            if enabled {
                calendar.last_errors_count = 0;
            }
        })
    }
}

impl<T> Store for Arc<T>
where
    T: Store + ?Sized,
{
    fn all_calendars(&self) -> Result<Vec<CalendarConfig>, StoreError> {
        (**self).all_calendars()
    }

    fn user_calendars(&self, user_id: &str) -> Result<Vec<CalendarConfig>, StoreError> {
        (**self).user_calendars(user_id)
    }

    fn load_calendar(&self, key: &CalendarKey) -> Result<CalendarConfig, StoreError> {
        (**self).load_calendar(key)
    }

    fn update_calendar(
        &self,
        key: &CalendarKey,
        update: &mut dyn FnMut(&mut CalendarConfig),
    ) -> Result<CalendarConfig, StoreError> {
        (**self).update_calendar(key, update)
    }

    fn add_calendar(
        &self,
        user_id: &str,
        url: &str,
        channel_id: &str,
    ) -> Result<CalendarConfig, StoreError> {
        (**self).add_calendar(user_id, url, channel_id)
    }

    fn delete_calendar(&self, key: &CalendarKey) -> Result<(), StoreError> {
        (**self).delete_calendar(key)
    }

    fn load_events(&self, key: &CalendarKey) -> Result<NotifiedState, StoreError> {
        (**self).load_events(key)
    }

    fn save_events(&self, key: &CalendarKey, state: &NotifiedState) -> Result<(), StoreError> {
        (**self).save_events(key, state)
    }

    fn load_user(&self, user_id: &str) -> Result<UserConfig, StoreError> {
        (**self).load_user(user_id)
    }

    fn save_user(&self, user_id: &str, user: &UserConfig) -> Result<(), StoreError> {
        (**self).save_user(user_id, user)
    }
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    users: IndexMap<String, UserRecord>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    #[serde(default)]
    config: UserConfig,
    #[serde(default)]
    calendars: IndexMap<String, CalendarRecord>,
    #[serde(default)]
    last_calendar_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalendarRecord {
    calendar: CalendarConfig,
    #[serde(default)]
    notified: NotifiedState,
}

impl StoreData {
    fn calendar(&self, key: &CalendarKey) -> Result<&CalendarRecord, StoreError> {
        self.users
            .get(&key.user_id)
            .and_then(|user| user.calendars.get(&key.calendar_id))
            .ok_or_else(|| StoreError::CalendarNotFound(key.clone()))
    }

    fn calendar_mut(&mut self, key: &CalendarKey) -> Result<&mut CalendarRecord, StoreError> {
        self.users
            .get_mut(&key.user_id)
            .and_then(|user| user.calendars.get_mut(&key.calendar_id))
            .ok_or_else(|| StoreError::CalendarNotFound(key.clone()))
    }
}

/// A `Store` keeping everything in memory and mirroring it to a JSON file after every write.
#[derive(Debug)]
pub struct FileStore {
    backing_file: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl FileStore {
    /// Opens the store backed by `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<FileStore, StoreError> {
        let data = match fs::File::open(path) {
            Ok(file) => serde_json::from_reader(io::BufReader::new(file))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::info!("no state at {}, starting empty", path.display());
                StoreData::default()
            }
            Err(err) => return Err(err.into()),
        };

        Ok(FileStore {
            backing_file: Some(path.to_path_buf()),
            data: Mutex::new(data),
        })
    }

    /// Creates a store that is never written to disk.
    pub fn in_memory() -> FileStore {
        FileStore {
            backing_file: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&StoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        f(&data)
    }

    /// Applies `f` to a copy of the data, persists the copy and only then makes it current, so a
    /// failed write leaves memory and disk in the same state.
    fn write<T>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        let mut next = data.clone();
        let result = f(&mut next)?;

        self.save_to_file(&next)?;
        *data = next;

        Ok(result)
    }

    fn save_to_file(&self, data: &StoreData) -> Result<(), StoreError> {
        let Some(path) = &self.backing_file else {
            return Ok(());
        };

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        // Write a sibling file and rename it over the old state.
        let tmp_path = path.with_extension("json.tmp");
        let mut writer = BufWriter::new(fs::File::create(&tmp_path)?);
        serde_json::to_writer_pretty(&mut writer, data)?;
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn all_calendars(&self) -> Result<Vec<CalendarConfig>, StoreError> {
        self.read(|data| {
            Ok(data
                .users
                .values()
                .flat_map(|user| user.calendars.values())
                .map(|record| record.calendar.clone())
                .collect())
        })
    }

    fn user_calendars(&self, user_id: &str) -> Result<Vec<CalendarConfig>, StoreError> {
        self.read(|data| {
            Ok(data
                .users
                .get(user_id)
                .map(|user| {
                    user.calendars
                        .values()
                        .map(|record| record.calendar.clone())
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn load_calendar(&self, key: &CalendarKey) -> Result<CalendarConfig, StoreError> {
        self.read(|data| Ok(data.calendar(key)?.calendar.clone()))
    }

    fn update_calendar(
        &self,
        key: &CalendarKey,
        update: &mut dyn FnMut(&mut CalendarConfig),
    ) -> Result<CalendarConfig, StoreError> {
        self.write(|data| {
            let record = data.calendar_mut(key)?;
            update(&mut record.calendar);
            // The key is not up for change.
            record.calendar.user_id = key.user_id.clone();
            record.calendar.id = key.calendar_id.clone();
            Ok(record.calendar.clone())
        })
    }

    fn add_calendar(
        &self,
        user_id: &str,
        url: &str,
        channel_id: &str,
    ) -> Result<CalendarConfig, StoreError> {
        self.write(|data| {
            let user = data.users.entry(user_id.to_owned()).or_default();
            user.last_calendar_id += 1;

            let calendar = CalendarConfig::new(
                user_id,
                user.last_calendar_id.to_string(),
                url,
                channel_id,
            );
            user.calendars.insert(
                calendar.id.clone(),
                CalendarRecord {
                    calendar: calendar.clone(),
                    notified: NotifiedState::default(),
                },
            );

            log::info!("added calendar {}", calendar.key());
            Ok(calendar)
        })
    }

    fn delete_calendar(&self, key: &CalendarKey) -> Result<(), StoreError> {
        self.write(|data| {
            data.users
                .get_mut(&key.user_id)
                .and_then(|user| user.calendars.shift_remove(&key.calendar_id))
                .ok_or_else(|| StoreError::CalendarNotFound(key.clone()))?;

            log::info!("deleted calendar {}", key);
            Ok(())
        })
    }

    fn load_events(&self, key: &CalendarKey) -> Result<NotifiedState, StoreError> {
        self.read(|data| Ok(data.calendar(key)?.notified.clone()))
    }

    fn save_events(&self, key: &CalendarKey, state: &NotifiedState) -> Result<(), StoreError> {
        self.write(|data| {
            data.calendar_mut(key)?.notified = state.clone();
            Ok(())
        })
    }

    fn load_user(&self, user_id: &str) -> Result<UserConfig, StoreError> {
        self.read(|data| {
            Ok(data
                .users
                .get(user_id)
                .map(|user| user.config.clone())
                .unwrap_or_default())
        })
    }

    fn save_user(&self, user_id: &str, user: &UserConfig) -> Result<(), StoreError> {
        self.write(|data| {
            data.users.entry(user_id.to_owned()).or_default().config = user.clone();
            Ok(())
        })
    }
}
