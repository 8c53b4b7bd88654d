//! Data roles for items.
//!
//! Roles define what piece of an item's data is being requested. Consumers of
//! a flat projection (list views, table bindings) read items exclusively
//! through `(row, role)` pairs.

/// Standard roles for accessing different aspects of item data.
///
/// # Standard Roles
///
/// - **Id**: Stable numeric identifier of the item
/// - **Title**: Human readable name
/// - **Thumbnail**: Location of a preview image
/// - **Duration**: Length in milliseconds
/// - **Progress**: Playback progress in `0.0..=1.0`
/// - **PlayCount**: Number of completed plays
/// - **Mrl**: Resource locator used to open the item
/// - **DisplayMrl**: Resource locator formatted for display
/// - **TitleFirstSymbol**: Section letter derived from the title
/// - **User**: First role available for application-specific data
///
/// # Example
///
/// ```
/// use flatlist::{Item, ItemData, ItemRole};
///
/// let item = Item::new();
/// item.set_data(ItemRole::Title, "Big Buck Bunny");
///
/// assert_eq!(item.data(ItemRole::Title).as_string(), Some("Big Buck Bunny"));
/// assert_eq!(item.data(ItemRole::TitleFirstSymbol).as_string(), Some("B"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemRole {
    /// Stable identifier. Always available, returns `Int`.
    Id,
    /// Primary text to display. Should return `String`.
    Title,
    /// Preview image location. Should return `String`.
    Thumbnail,
    /// Length in milliseconds. Should return `Int`.
    Duration,
    /// Playback progress. Should return `Float`.
    Progress,
    /// Completed play count. Should return `Int`.
    PlayCount,
    /// Resource locator. Should return `String`.
    Mrl,
    /// Resource locator for display. Should return `String`.
    DisplayMrl,
    /// Derived from `Title`, returns a one-character `String`.
    TitleFirstSymbol,
    /// Application-specific data. Use `ItemRole::User(n)` for custom roles.
    User(u32),
}

impl ItemRole {
    /// All standard roles, in role-name order.
    pub const STANDARD: [ItemRole; 9] = [
        ItemRole::Id,
        ItemRole::Title,
        ItemRole::Thumbnail,
        ItemRole::Duration,
        ItemRole::Progress,
        ItemRole::PlayCount,
        ItemRole::Mrl,
        ItemRole::DisplayMrl,
        ItemRole::TitleFirstSymbol,
    ];

    /// Returns `true` if this is a user-defined role.
    #[inline]
    pub fn is_user_role(&self) -> bool {
        matches!(self, ItemRole::User(_))
    }

    /// Returns `true` if the value is computed rather than stored.
    #[inline]
    pub fn is_derived(&self) -> bool {
        matches!(self, ItemRole::Id | ItemRole::TitleFirstSymbol)
    }

    /// Returns the numeric value of this role.
    ///
    /// Standard roles have fixed values 0-255.
    /// User roles have values >= 256.
    pub fn value(&self) -> u32 {
        match self {
            ItemRole::Id => 0,
            ItemRole::Title => 1,
            ItemRole::Thumbnail => 2,
            ItemRole::Duration => 3,
            ItemRole::Progress => 4,
            ItemRole::PlayCount => 5,
            ItemRole::Mrl => 6,
            ItemRole::DisplayMrl => 7,
            ItemRole::TitleFirstSymbol => 8,
            ItemRole::User(n) => 256 + n,
        }
    }

    /// Creates an ItemRole from a numeric value.
    ///
    /// Returns `None` for reserved but undefined role values (9-255).
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(ItemRole::Id),
            1 => Some(ItemRole::Title),
            2 => Some(ItemRole::Thumbnail),
            3 => Some(ItemRole::Duration),
            4 => Some(ItemRole::Progress),
            5 => Some(ItemRole::PlayCount),
            6 => Some(ItemRole::Mrl),
            7 => Some(ItemRole::DisplayMrl),
            8 => Some(ItemRole::TitleFirstSymbol),
            9..=255 => None,
            n => Some(ItemRole::User(n - 256)),
        }
    }

    /// The name a view binds this role to. User roles have no standard name.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            ItemRole::Id => Some("id"),
            ItemRole::Title => Some("title"),
            ItemRole::Thumbnail => Some("thumbnail"),
            ItemRole::Duration => Some("duration"),
            ItemRole::Progress => Some("progress"),
            ItemRole::PlayCount => Some("playcount"),
            ItemRole::Mrl => Some("mrl"),
            ItemRole::DisplayMrl => Some("display_mrl"),
            ItemRole::TitleFirstSymbol => Some("title_first_symbol"),
            ItemRole::User(_) => None,
        }
    }

    /// Looks up a standard role by its view binding name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::STANDARD
            .iter()
            .copied()
            .find(|role| role.name() == Some(name))
    }
}

/// Section symbol for a title: its uppercased first letter, or `#` when the
/// title starts with anything other than a letter.
pub(crate) fn first_symbol(title: &str) -> String {
    match title.trim_start().chars().next() {
        Some(c) if c.is_alphabetic() => c.to_uppercase().collect(),
        _ => "#".to_string(),
    }
}

/// Container for item data.
///
/// `ItemData` holds the value associated with one item role and provides
/// typed access through the `as_*` methods.
///
/// # Example
///
/// ```
/// use flatlist::ItemData;
///
/// let data = ItemData::from("Hello");
/// assert_eq!(data.as_string(), Some("Hello"));
/// assert!(data.as_int().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ItemData {
    /// No data.
    #[default]
    None,
    /// String data (titles, locators).
    String(String),
    /// Integer data.
    Int(i64),
    /// Floating point data.
    Float(f64),
    /// Boolean data.
    Bool(bool),
}

impl ItemData {
    /// Returns `true` if this is `ItemData::None`.
    pub fn is_none(&self) -> bool {
        matches!(self, ItemData::None)
    }

    /// Returns `true` if this contains some data.
    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Attempts to get the data as a string slice.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            ItemData::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Attempts to get the data as an owned string.
    pub fn into_string(self) -> Option<String> {
        match self {
            ItemData::String(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to get the data as an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ItemData::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to get the data as a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ItemData::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to get the data as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ItemData::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<String> for ItemData {
    fn from(s: String) -> Self {
        ItemData::String(s)
    }
}

impl From<&str> for ItemData {
    fn from(s: &str) -> Self {
        ItemData::String(s.to_string())
    }
}

impl From<i64> for ItemData {
    fn from(n: i64) -> Self {
        ItemData::Int(n)
    }
}

impl From<i32> for ItemData {
    fn from(n: i32) -> Self {
        ItemData::Int(n as i64)
    }
}

impl From<u64> for ItemData {
    fn from(n: u64) -> Self {
        ItemData::Int(n as i64)
    }
}

impl From<f64> for ItemData {
    fn from(n: f64) -> Self {
        ItemData::Float(n)
    }
}

impl From<bool> for ItemData {
    fn from(b: bool) -> Self {
        ItemData::Bool(b)
    }
}

impl From<Option<String>> for ItemData {
    fn from(opt: Option<String>) -> Self {
        match opt {
            Some(s) => ItemData::String(s),
            None => ItemData::None,
        }
    }
}
