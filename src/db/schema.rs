//! Database schema and record types

use crate::chat::{full_name, ChatId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS shelters (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    province TEXT,
    city TEXT,
    precise_location TEXT,
    treasury INTEGER NOT NULL DEFAULT 0,
    stockpile TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    first_name TEXT NOT NULL,
    last_name TEXT,
    username TEXT,
    survival_percentage REAL NOT NULL DEFAULT 0,
    shelter_id INTEGER REFERENCES shelters(id) ON DELETE SET NULL,
    coins INTEGER NOT NULL DEFAULT 10000,
    backpack_level INTEGER NOT NULL DEFAULT 0,
    backpack_content TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_shelter ON users(shelter_id);

CREATE TABLE IF NOT EXISTS possible_shelters (
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    shelter_id INTEGER NOT NULL REFERENCES shelters(id) ON DELETE CASCADE,
    PRIMARY KEY (user_id, shelter_id)
);

CREATE TABLE IF NOT EXISTS shop_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    description TEXT,
    price INTEGER NOT NULL DEFAULT 0,
    stock INTEGER,
    item_type TEXT NOT NULL DEFAULT 'general',
    level INTEGER,
    UNIQUE (item_type, level)
);

CREATE TABLE IF NOT EXISTS question_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    question TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'zombie',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_history_user ON question_history(user_id, created_at DESC);
";

/// Player record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub survival_percentage: f64,
    pub shelter_id: Option<ChatId>,
    pub coins: i64,
    pub backpack_level: i64,
    pub backpack: Vec<BackpackItem>,
}

impl User {
    pub fn display_name(&self) -> String {
        full_name(&self.first_name, self.last_name.as_deref())
    }

    /// Capacity of the backpack at the current level (0 without one)
    pub fn backpack_capacity(&self) -> i64 {
        if self.backpack_level <= 0 {
            0
        } else {
            50 + (self.backpack_level - 1) * 25
        }
    }

    pub fn backpack_used(&self) -> i64 {
        self.backpack.iter().map(|i| i.quantity).sum()
    }
}

/// A stack of identical items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackpackItem {
    pub name: String,
    pub quantity: i64,
}

/// Shelter record; the id is the group conversation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelter {
    pub id: ChatId,
    pub name: String,
    pub province: Option<String>,
    pub city: Option<String>,
    pub treasury: i64,
    pub stockpile: Vec<BackpackItem>,
    pub created_at: DateTime<Utc>,
}

/// Fields written when a shelter is registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShelter {
    pub id: ChatId,
    pub name: String,
    pub province: String,
    pub city: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Backpack,
    BackpackUpgrade,
    General,
}

impl ItemType {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemType::Backpack => "backpack",
            ItemType::BackpackUpgrade => "backpack_upgrade",
            ItemType::General => "general",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "backpack" => ItemType::Backpack,
            "backpack_upgrade" => ItemType::BackpackUpgrade,
            _ => ItemType::General,
        }
    }

    pub fn is_backpack_tier(self) -> bool {
        matches!(self, ItemType::Backpack | ItemType::BackpackUpgrade)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopItem {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    /// `None` means unlimited
    pub stock: Option<i64>,
    pub item_type: ItemType,
    pub level: Option<i64>,
}

/// Items seeded into an empty shop
pub fn default_shop_items() -> Vec<ShopItem> {
    vec![
        ShopItem {
            id: 0,
            name: "Small backpack".to_string(),
            description: Some("A simple backpack with basic capacity.".to_string()),
            price: 150,
            stock: None,
            item_type: ItemType::Backpack,
            level: Some(1),
        },
        ShopItem {
            id: 0,
            name: "Upgrade to medium backpack".to_string(),
            description: Some("Raises backpack capacity to the medium tier.".to_string()),
            price: 200,
            stock: None,
            item_type: ItemType::BackpackUpgrade,
            level: Some(2),
        },
        ShopItem {
            id: 0,
            name: "Upgrade to large backpack".to_string(),
            description: Some("The final tier with the largest capacity.".to_string()),
            price: 250,
            stock: None,
            item_type: ItemType::BackpackUpgrade,
            level: Some(3),
        },
    ]
}

/// Result of moving coins or supplies into a shelter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DonationOutcome {
    Completed {
        /// What the donor has left
        donor_balance: i64,
        /// What the shelter now holds
        shelter_balance: i64,
    },
    Insufficient,
    /// Donor or shelter no longer exists
    Missing,
}

/// Result of a shop purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased { item: ShopItem, coins_left: i64 },
    ItemMissing,
    UserMissing,
    InsufficientCoins,
    /// Backpack tiers must be bought in order
    TierLocked,
    OutOfStock,
}
