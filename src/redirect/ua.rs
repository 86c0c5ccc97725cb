use once_cell::sync::Lazy;
use woothee::parser::Parser;

static PARSER: Lazy<Parser> = Lazy::new(Parser::new);

/// Device class a redirect request is bucketed into.
///
/// Desktop traffic of any OS (including macOS) falls into `Web`; only the
/// mobile platforms get their own buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Android,
    Ios,
    Web,
}

/// Classify a User-Agent string. Unknown or missing agents count as web.
pub fn classify_device(user_agent: &str) -> DeviceClass {
    match PARSER.parse(user_agent) {
        Some(result) => match result.os {
            "Android" => DeviceClass::Android,
            "iPhone" | "iPad" | "iPod" => DeviceClass::Ios,
            _ => DeviceClass::Web,
        },
        None => DeviceClass::Web,
    }
}
