pub const APP_NAME: &str = "Parcel Quote";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `User-Agent` sent with every outgoing request.
pub fn user_agent() -> String {
    format!("parcel-quote/{APP_VERSION}")
}

pub fn version_label() -> String {
    format!("{APP_NAME} v{APP_VERSION}")
}
