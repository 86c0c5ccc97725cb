pub mod url;

pub use url::{CreateUrlRequest, DeviceUrl, Platform, UpdateUrlRequest, UrlRecord};
