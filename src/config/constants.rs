pub const LISTEN_ADDR: &str = "127.0.0.1:8787";

pub const CLIENT_ENDPOINT: &str = "http://localhost:8787";

pub const UPSTREAM_ENDPOINT: &str = "https://api.openai.com";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Frames buffered between the relay task and the response body
pub const FRAME_BUFFER: usize = 32;

/// Page size used when listing upstream thread messages
pub const MESSAGE_PAGE_SIZE: usize = 100;
