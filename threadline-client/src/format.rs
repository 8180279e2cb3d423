use crate::api::Time;

const UNITS: [(&str, i64); 7] = [
    ("year", 31_536_000),
    ("month", 2_592_000),
    ("week", 604_800),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
    ("second", 1),
];

/// Formats `date` relative to `now`, eg. "2 hours ago" or "yesterday"
pub fn format_relative_time(date: Time, now: Time) -> String {
    let secs = (now - date).num_seconds();
    for (unit, unit_secs) in UNITS {
        let count = secs / unit_secs;
        if count < 1 {
            continue;
        }
        return match (unit, count) {
            ("day", 1) => String::from("yesterday"),
            ("year" | "month" | "week", 1) => format!("last {unit}"),
            (_, 1) => format!("1 {unit} ago"),
            _ => format!("{count} {unit}s ago"),
        };
    }
    String::from("just now")
}
