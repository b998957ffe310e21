pub const PAGE_SIZE: i64 = 6;
pub const RECIPES_LIMIT: i64 = 6;
pub const MAX_PAGE: i64 = i32::MAX as i64;

pub const RECIPE_NAME_LENGTH: usize = 256;
pub const INGREDIENT_NAME_LENGTH: usize = 128;
pub const UNIT_NAME_LENGTH: usize = 64;
pub const TAG_LENGTH: usize = 32;
pub const USERNAME_LENGTH: usize = 150;
pub const EMAIL_LENGTH: usize = 254;

/// Amounts and cooking times are stored as small positive integers.
pub const MIN_AMOUNT: i64 = 1;
pub const MAX_AMOUNT: i64 = 32767;
pub const MIN_COOKING_TIME: i64 = 1;
pub const MAX_COOKING_TIME: i64 = 32767;

pub const SHORT_LINK_LENGTH: usize = 3;
pub const SHORT_LINK_ATTEMPTS: usize = 64;

pub const CATALOG_CACHE_SECONDS: u64 = 60 * 60;

pub const SESSION_HOURS: i64 = 24;

pub const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

pub const RESERVED_USERNAMES: &[&str] = &["me"];

pub const IMAGE_FORMATS: &[(&str, &str)] = &[
    ("png", "png"),
    ("jpeg", "jpg"),
    ("jpg", "jpg"),
    ("gif", "gif"),
    ("webp", "webp"),
];
