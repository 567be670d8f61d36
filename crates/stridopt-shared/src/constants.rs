/// Application name
pub const APP_NAME: &str = "Stridopt";

/// Key under which the last known identity is cached locally
pub const SESSION_KEY: &str = "@stridopt:session";

/// Backend collection names
pub const USERS: &str = "users";
pub const EVENTS: &str = "events";
pub const FRIENDS: &str = "friends";
pub const FRIEND_REQUESTS: &str = "friendRequests";
pub const CHATS: &str = "chats";
pub const MESSAGES: &str = "messages";
pub const NOTIFICATIONS: &str = "notifications";
pub const TASKS: &str = "tasks";

/// Blob path prefixes
pub const CHAT_IMAGES_PREFIX: &str = "chat_images";
pub const PROFILE_IMAGES_PREFIX: &str = "profile_images";

/// Live subscription retry bound (consecutive failures before giving up)
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Linear backoff step in milliseconds (failure N waits N steps)
pub const DEFAULT_RETRY_STEP_MS: u64 = 1_000;

/// One day in milliseconds, used by the streak scan
pub const DAY_MS: i64 = 1000 * 60 * 60 * 24;

/// Input limits
pub const MAX_EMAIL_LENGTH: usize = 100;
pub const MAX_PASSWORD_LENGTH: usize = 50;
pub const MIN_NAME_LENGTH: usize = 2;
pub const MAX_EVENT_TITLE_LENGTH: usize = 30;
pub const MIN_AGE_YEARS: i32 = 13;

/// Fallbacks for denormalized display fields
pub const UNKNOWN_USER: &str = "Unknown User";
pub const UNKNOWN_EMAIL: &str = "Unknown Email";
pub const DEFAULT_GROUP_NAME: &str = "Group Chat";
pub const IMAGE_MESSAGE_PREVIEW: &str = "📷 Image";
