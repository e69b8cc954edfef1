//! Database module for the shelter bot
//!
//! Provides persistence for players, shelters, the shop and scenario history.

mod schema;

pub use schema::*;

use crate::chat::{Actor, ChatId, UserId};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt item list: {0}")]
    ItemList(#[from] serde_json::Error),
    #[error("Could not prepare database directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Insert the default backpack tiers when the shop is empty
    pub fn seed_shop_items(&self) -> DbResult<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM shop_items", [], |r| r.get(0))?;
        if count > 0 {
            return Ok(0);
        }
        let mut inserted = 0;
        for item in default_shop_items() {
            inserted += conn.execute(
                "INSERT OR IGNORE INTO shop_items
                    (name, description, price, stock, item_type, level)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.name,
                    item.description,
                    item.price,
                    item.stock,
                    item.item_type.as_str(),
                    item.level
                ],
            )?;
        }
        tracing::info!(inserted, "Seeded shop items");
        Ok(inserted)
    }

    // ==================== User Operations ====================

    pub fn user_exists(&self, id: UserId) -> DbResult<bool> {
        let conn = self.conn();
        let found: Option<i64> = conn
            .query_row("SELECT 1 FROM users WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    /// Create the player or refresh their profile fields
    pub fn upsert_user(&self, actor: &Actor) -> DbResult<()> {
        let conn = self.conn();
        let now = timestamp(Utc::now());
        conn.execute(
            "INSERT INTO users (id, first_name, last_name, username, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                username = excluded.username,
                updated_at = excluded.updated_at",
            params![actor.id, actor.first_name, actor.last_name, actor.username, now],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> DbResult<Option<User>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                raw_user,
            )
            .optional()?;
        row.map(RawUser::into_user).transpose()
    }

    /// Returns false when the player does not exist
    pub fn set_user_shelter(&self, id: UserId, shelter: Option<ChatId>) -> DbResult<bool> {
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE users SET shelter_id = ?1, updated_at = ?2 WHERE id = ?3",
            params![shelter, timestamp(Utc::now()), id],
        )?;
        Ok(updated > 0)
    }

    /// Record `shelter` as joinable by `user`; no-op unless both exist
    pub fn add_possible_shelter(&self, user: UserId, shelter: ChatId) -> DbResult<bool> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO possible_shelters (user_id, shelter_id)
             SELECT ?1, ?2
             WHERE EXISTS (SELECT 1 FROM users WHERE id = ?1)
               AND EXISTS (SELECT 1 FROM shelters WHERE id = ?2)",
            params![user, shelter],
        )?;
        Ok(inserted > 0)
    }

    pub fn possible_shelters(&self, user: UserId) -> DbResult<Vec<Shelter>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SHELTER_COLUMNS} FROM shelters s
             JOIN possible_shelters p ON p.shelter_id = s.id
             WHERE p.user_id = ?1
             ORDER BY s.name"
        ))?;
        let rows = stmt.query_map(params![user], raw_shelter)?;
        let raws = rows.collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawShelter::into_shelter).collect()
    }

    /// Add a survival evaluation: the stored percentage becomes the mean of
    /// the old value and `scenario_average`. Returns the new value.
    pub fn record_survival_score(
        &self,
        id: UserId,
        scenario_average: f64,
    ) -> DbResult<Option<f64>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let old: Option<f64> = tx
            .query_row(
                "SELECT survival_percentage FROM users WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(old) = old else {
            return Ok(None);
        };
        let new = (old + scenario_average) / 2.0;
        tx.execute(
            "UPDATE users SET survival_percentage = ?1, updated_at = ?2 WHERE id = ?3",
            params![new, timestamp(Utc::now()), id],
        )?;
        tx.commit()?;
        Ok(Some(new))
    }

    // ==================== Shelter Operations ====================

    /// Register a shelter, renaming it if the group was registered before
    pub fn upsert_shelter(&self, shelter: &NewShelter) -> DbResult<()> {
        let conn = self.conn();
        let now = timestamp(Utc::now());
        conn.execute(
            "INSERT INTO shelters (id, name, province, city, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                province = excluded.province,
                city = excluded.city,
                updated_at = excluded.updated_at",
            params![shelter.id, shelter.name, shelter.province, shelter.city, now],
        )?;
        Ok(())
    }

    pub fn get_shelter(&self, id: ChatId) -> DbResult<Option<Shelter>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                &format!("SELECT {SHELTER_COLUMNS} FROM shelters s WHERE s.id = ?1"),
                params![id],
                raw_shelter,
            )
            .optional()?;
        row.map(RawShelter::into_shelter).transpose()
    }

    pub fn shelter_members(&self, id: ChatId) -> DbResult<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE shelter_id = ?1 ORDER BY first_name, id"
        ))?;
        let rows = stmt.query_map(params![id], raw_user)?;
        let raws = rows.collect::<Result<Vec<_>, _>>()?;
        raws.into_iter().map(RawUser::into_user).collect()
    }

    /// Detach every member and delete the shelter. Returns how many members
    /// were detached.
    pub fn delete_shelter(&self, id: ChatId) -> DbResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let detached = tx.execute(
            "UPDATE users SET shelter_id = NULL, updated_at = ?1 WHERE shelter_id = ?2",
            params![timestamp(Utc::now()), id],
        )?;
        tx.execute(
            "DELETE FROM possible_shelters WHERE shelter_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM shelters WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(detached)
    }

    // ==================== Donations ====================

    /// Move `amount` coins from the player to the shelter treasury
    pub fn donate_coins(
        &self,
        user: UserId,
        shelter: ChatId,
        amount: i64,
    ) -> DbResult<DonationOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let coins: Option<i64> = tx
            .query_row("SELECT coins FROM users WHERE id = ?1", params![user], |r| {
                r.get(0)
            })
            .optional()?;
        let treasury: Option<i64> = tx
            .query_row(
                "SELECT treasury FROM shelters WHERE id = ?1",
                params![shelter],
                |r| r.get(0),
            )
            .optional()?;
        let (Some(coins), Some(treasury)) = (coins, treasury) else {
            return Ok(DonationOutcome::Missing);
        };
        if amount <= 0 || amount > coins {
            return Ok(DonationOutcome::Insufficient);
        }

        let now = timestamp(Utc::now());
        tx.execute(
            "UPDATE users SET coins = coins - ?1, updated_at = ?2 WHERE id = ?3",
            params![amount, now, user],
        )?;
        tx.execute(
            "UPDATE shelters SET treasury = treasury + ?1, updated_at = ?2 WHERE id = ?3",
            params![amount, now, shelter],
        )?;
        tx.commit()?;
        Ok(DonationOutcome::Completed {
            donor_balance: coins - amount,
            shelter_balance: treasury + amount,
        })
    }

    /// Move `quantity` of `item` from the player's backpack to the shelter
    /// stockpile. Item names match exactly.
    pub fn donate_supplies(
        &self,
        user: UserId,
        shelter: ChatId,
        item: &str,
        quantity: i64,
    ) -> DbResult<DonationOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let backpack: Option<String> = tx
            .query_row(
                "SELECT backpack_content FROM users WHERE id = ?1",
                params![user],
                |r| r.get(0),
            )
            .optional()?;
        let stockpile: Option<String> = tx
            .query_row(
                "SELECT stockpile FROM shelters WHERE id = ?1",
                params![shelter],
                |r| r.get(0),
            )
            .optional()?;
        let (Some(backpack), Some(stockpile)) = (backpack, stockpile) else {
            return Ok(DonationOutcome::Missing);
        };
        let mut backpack: Vec<BackpackItem> = serde_json::from_str(&backpack)?;
        let mut stockpile: Vec<BackpackItem> = serde_json::from_str(&stockpile)?;

        let Some(donor_balance) = take_items(&mut backpack, item, quantity) else {
            return Ok(DonationOutcome::Insufficient);
        };
        let shelter_balance = add_items(&mut stockpile, item, quantity);

        let now = timestamp(Utc::now());
        tx.execute(
            "UPDATE users SET backpack_content = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&backpack)?, now, user],
        )?;
        tx.execute(
            "UPDATE shelters SET stockpile = ?1, updated_at = ?2 WHERE id = ?3",
            params![serde_json::to_string(&stockpile)?, now, shelter],
        )?;
        tx.commit()?;
        Ok(DonationOutcome::Completed {
            donor_balance,
            shelter_balance,
        })
    }

    /// Put items into a player's backpack, ignoring capacity
    #[cfg(test)]
    pub fn give_items(&self, user: UserId, item: &str, quantity: i64) -> DbResult<()> {
        let conn = self.conn();
        let raw: String = conn.query_row(
            "SELECT backpack_content FROM users WHERE id = ?1",
            params![user],
            |r| r.get(0),
        )?;
        let mut backpack: Vec<BackpackItem> = serde_json::from_str(&raw)?;
        add_items(&mut backpack, item, quantity);
        conn.execute(
            "UPDATE users SET backpack_content = ?1 WHERE id = ?2",
            params![serde_json::to_string(&backpack)?, user],
        )?;
        Ok(())
    }

    // ==================== Shop ====================

    pub fn shop_items(&self) -> DbResult<Vec<ShopItem>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, price, stock, item_type, level
             FROM shop_items ORDER BY id",
        )?;
        let items = stmt
            .query_map([], shop_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Buy one unit of an item. Backpack tiers raise the backpack level and
    /// must be bought in order.
    pub fn purchase(&self, user: UserId, item_id: i64) -> DbResult<PurchaseOutcome> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let item = tx
            .query_row(
                "SELECT id, name, description, price, stock, item_type, level
                 FROM shop_items WHERE id = ?1",
                params![item_id],
                shop_item_from_row,
            )
            .optional()?;
        let Some(item) = item else {
            return Ok(PurchaseOutcome::ItemMissing);
        };
        let player: Option<(i64, i64)> = tx
            .query_row(
                "SELECT coins, backpack_level FROM users WHERE id = ?1",
                params![user],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((coins, backpack_level)) = player else {
            return Ok(PurchaseOutcome::UserMissing);
        };

        if item.stock.is_some_and(|s| s <= 0) {
            return Ok(PurchaseOutcome::OutOfStock);
        }
        if coins < item.price {
            return Ok(PurchaseOutcome::InsufficientCoins);
        }
        let new_level = if item.item_type.is_backpack_tier() {
            let level = item.level.unwrap_or(0);
            if backpack_level != level - 1 {
                return Ok(PurchaseOutcome::TierLocked);
            }
            level
        } else {
            backpack_level
        };

        let coins_left = coins - item.price;
        tx.execute(
            "UPDATE users SET coins = ?1, backpack_level = ?2, updated_at = ?3 WHERE id = ?4",
            params![coins_left, new_level, timestamp(Utc::now()), user],
        )?;
        if item.stock.is_some() {
            tx.execute(
                "UPDATE shop_items SET stock = stock - 1 WHERE id = ?1",
                params![item.id],
            )?;
        }
        tx.commit()?;
        Ok(PurchaseOutcome::Purchased { item, coins_left })
    }

    // ==================== Scenario History ====================

    pub fn purge_history_before(&self, user: UserId, cutoff: DateTime<Utc>) -> DbResult<usize> {
        let conn = self.conn();
        Ok(conn.execute(
            "DELETE FROM question_history WHERE user_id = ?1 AND created_at < ?2",
            params![user, timestamp(cutoff)],
        )?)
    }

    /// Most recent questions first
    pub fn recent_questions(&self, user: UserId, limit: usize) -> DbResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT question FROM question_history WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let questions = stmt
            .query_map(params![user, limit], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(questions)
    }

    pub fn record_question(&self, user: UserId, question: &str) -> DbResult<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO question_history (user_id, question, created_at) VALUES (?1, ?2, ?3)",
            params![user, question, timestamp(Utc::now())],
        )?;
        Ok(())
    }

    /// Keep only the `keep` most recent entries for `user`
    pub fn trim_history(&self, user: UserId, keep: usize) -> DbResult<usize> {
        let conn = self.conn();
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        Ok(conn.execute(
            "DELETE FROM question_history WHERE user_id = ?1 AND id NOT IN (
                SELECT id FROM question_history WHERE user_id = ?1
                ORDER BY created_at DESC, id DESC LIMIT ?2
             )",
            params![user, keep],
        )?)
    }

    pub fn clear_history(&self) -> DbResult<usize> {
        let conn = self.conn();
        Ok(conn.execute("DELETE FROM question_history", [])?)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

const USER_COLUMNS: &str = "id, first_name, last_name, username, survival_percentage, \
     shelter_id, coins, backpack_level, backpack_content";

const SHELTER_COLUMNS: &str =
    "s.id, s.name, s.province, s.city, s.treasury, s.stockpile, s.created_at";

/// User row before the backpack JSON is decoded
struct RawUser {
    user: User,
    backpack: String,
}

impl RawUser {
    fn into_user(self) -> DbResult<User> {
        let mut user = self.user;
        user.backpack = serde_json::from_str(&self.backpack)?;
        Ok(user)
    }
}

fn raw_user(row: &Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        user: User {
            id: row.get(0)?,
            first_name: row.get(1)?,
            last_name: row.get(2)?,
            username: row.get(3)?,
            survival_percentage: row.get(4)?,
            shelter_id: row.get(5)?,
            coins: row.get(6)?,
            backpack_level: row.get(7)?,
            backpack: Vec::new(),
        },
        backpack: row.get(8)?,
    })
}

struct RawShelter {
    shelter: Shelter,
    stockpile: String,
}

impl RawShelter {
    fn into_shelter(self) -> DbResult<Shelter> {
        let mut shelter = self.shelter;
        shelter.stockpile = serde_json::from_str(&self.stockpile)?;
        Ok(shelter)
    }
}

fn raw_shelter(row: &Row<'_>) -> rusqlite::Result<RawShelter> {
    Ok(RawShelter {
        shelter: Shelter {
            id: row.get(0)?,
            name: row.get(1)?,
            province: row.get(2)?,
            city: row.get(3)?,
            treasury: row.get(4)?,
            stockpile: Vec::new(),
            created_at: parse_datetime(&row.get::<_, String>(6)?),
        },
        stockpile: row.get(5)?,
    })
}

fn shop_item_from_row(row: &Row<'_>) -> rusqlite::Result<ShopItem> {
    Ok(ShopItem {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price: row.get(3)?,
        stock: row.get(4)?,
        item_type: ItemType::parse(&row.get::<_, String>(5)?),
        level: row.get(6)?,
    })
}

/// Fixed-width RFC 3339 so stored timestamps sort as text
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

/// Remove `quantity` of `name`, returning what is left of it
fn take_items(items: &mut Vec<BackpackItem>, name: &str, quantity: i64) -> Option<i64> {
    if quantity <= 0 {
        return None;
    }
    let idx = items.iter().position(|i| i.name == name)?;
    let remaining = items[idx].quantity - quantity;
    if remaining < 0 {
        return None;
    }
    if remaining == 0 {
        items.remove(idx);
    } else {
        items[idx].quantity = remaining;
    }
    Some(remaining)
}

/// Add `quantity` of `name`, returning the new total of it
fn add_items(items: &mut Vec<BackpackItem>, name: &str, quantity: i64) -> i64 {
    if let Some(existing) = items.iter_mut().find(|i| i.name == name) {
        existing.quantity += quantity;
        existing.quantity
    } else {
        items.push(BackpackItem {
            name: name.to_string(),
            quantity,
        });
        quantity
    }
}
