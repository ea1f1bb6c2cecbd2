use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime, UtcOffset,
};

/// Render an instant the way the API expects: RFC 3339 in UTC with a `Z` suffix.
pub fn format_api_timestamp(ts: OffsetDateTime) -> String {
    ts.to_offset(UtcOffset::UTC)
        .format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

/// Parse a user-supplied timestamp.
///
/// Accepts RFC 3339, or a naive `YYYY-MM-DD[THH:MM:SS]` which is taken as UTC.
pub fn parse_cli_timestamp(s: &str) -> Result<OffsetDateTime, String> {
    let s = s.trim();
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Ok(ts);
    }

    let naive_t = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let naive_space = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    for fmt in [naive_t, naive_space] {
        if let Ok(ts) = PrimitiveDateTime::parse(s, fmt) {
            return Ok(ts.assume_utc());
        }
    }

    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map(|d| d.midnight().assume_utc())
        .map_err(|_| format!("invalid timestamp '{s}', expected ISO 8601"))
}

/// Parse an HTTP `Date` header (IMF-fixdate, always GMT).
pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    let fmt = format_description!(
        "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
    );
    PrimitiveDateTime::parse(value.trim(), fmt)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}
