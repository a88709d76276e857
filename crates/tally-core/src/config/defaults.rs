//! Default value functions for serde.

pub(super) fn default_name() -> String {
    "Tally".to_string()
}
pub(super) fn default_data_dir() -> String {
    "~/.tally".to_string()
}
pub(super) fn default_log_level() -> String {
    "info".to_string()
}
pub(super) fn default_host() -> String {
    "0.0.0.0".to_string()
}
pub(super) fn default_port() -> u16 {
    8080
}
pub(super) fn default_gateway_url() -> String {
    "http://localhost:8081".to_string()
}
pub(super) fn default_deny_message() -> String {
    "\u{1f512} This number is not linked to a verified account. Link it in the app first, then try again.".to_string()
}
pub(super) fn default_provider() -> String {
    "openai".to_string()
}
pub(super) fn default_true() -> bool {
    true
}
pub(super) fn default_anthropic_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}
pub(super) fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}
pub(super) fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
pub(super) fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}
pub(super) fn default_language() -> String {
    "pt".to_string()
}
pub(super) fn default_whisper_model() -> String {
    "whisper-1".to_string()
}
pub(super) fn default_vision_provider() -> String {
    "openai".to_string()
}
pub(super) fn default_db_path() -> String {
    "~/.tally/ledger.db".to_string()
}
pub(super) fn default_statement_limit() -> i64 {
    10
}
pub(super) fn default_currency_symbol() -> String {
    "R$".to_string()
}
pub(super) fn default_misc_marker() -> String {
    "misc".to_string()
}
pub(super) fn default_timeout_secs() -> u64 {
    30
}
