//! Well-known SCGI variable names.

pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";
pub const CONTENT_TYPE: &str = "CONTENT_TYPE";
/// The protocol version marker, always `1`.
pub const SCGI: &str = "SCGI";
pub const SERVER_SOFTWARE: &str = "SERVER_SOFTWARE";
pub const SERVER_NAME: &str = "SERVER_NAME";
pub const SERVER_ADDR: &str = "SERVER_ADDR";
pub const SERVER_PORT: &str = "SERVER_PORT";
pub const SERVER_PROTOCOL: &str = "SERVER_PROTOCOL";
pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
pub const REMOTE_PORT: &str = "REMOTE_PORT";
pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
pub const REQUEST_SCHEME: &str = "REQUEST_SCHEME";
pub const REQUEST_URI: &str = "REQUEST_URI";
pub const PATH_INFO: &str = "PATH_INFO";
pub const QUERY_STRING: &str = "QUERY_STRING";
pub const SCRIPT_NAME: &str = "SCRIPT_NAME";
pub const SCRIPT_FILENAME: &str = "SCRIPT_FILENAME";
pub const DOCUMENT_ROOT: &str = "DOCUMENT_ROOT";

/// Variables carrying HTTP request headers start with this prefix, `HTTP_HOST` is `Host`.
pub const HTTP_PREFIX: &str = "HTTP_";

/// The only protocol version there is.
pub const SCGI_VERSION: &str = "1";

/// Maps an HTTP header name to the name of the variable carrying it: `User-Agent` becomes `USER_AGENT`.
pub fn cgify_header_name(name: &str) -> String {
    name.chars().map(|c| if c == '-' { '_' } else { c.to_ascii_uppercase() }).collect()
}
