use super::constants::*;

pub(crate) fn log_level() -> Option<String> {
    Some("info".to_string())
}

pub(crate) fn listen_addr() -> String {
    LISTEN_ADDR.to_string()
}

pub(crate) fn frame_buffer() -> usize {
    FRAME_BUFFER
}

pub(crate) fn upstream_endpoint() -> String {
    UPSTREAM_ENDPOINT.to_string()
}

pub(crate) fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

pub(crate) fn client_endpoint() -> String {
    CLIENT_ENDPOINT.to_string()
}
