use std::fmt;

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use url::form_urlencoded;

/// Line break used between the three lines of an entry and after the last one.
pub const ENTRY_TERMINATOR: &str = "\r\n";

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// One `key=value` segment of a query string or form body.
///
/// `value` is `None` when the segment carried no `=`, so `flag` and `flag=`
/// render differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: Option<String>,
}

impl Param {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn bare(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for Param {
    fn from((key, value): (K, V)) -> Self {
        Self::new(key, value)
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={value}", self.key),
            None => f.write_str(&self.key),
        }
    }
}

/// One inbound callback request, captured for persistence.
///
/// Every field is opaque text: the recorder validates and escapes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub timestamp: OffsetDateTime,
    pub origin_address: String,
    pub query_parameters: Vec<Param>,
    pub form_fields: Vec<Param>,
}

impl NotificationEvent {
    pub fn new(timestamp: OffsetDateTime, origin_address: impl Into<String>) -> Self {
        Self {
            timestamp,
            origin_address: origin_address.into(),
            query_parameters: Vec::new(),
            form_fields: Vec::new(),
        }
    }

    pub fn now(origin_address: impl Into<String>) -> Self {
        Self::new(OffsetDateTime::now_utc(), origin_address)
    }

    pub fn with_query<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Param>,
    {
        self.query_parameters = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_form<I>(mut self, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Param>,
    {
        self.form_fields = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_else(|_| self.timestamp.to_string())
    }
}

/// Renders the three-line block appended to the log for `event`.
pub fn format_entry(event: &NotificationEvent) -> String {
    format!(
        "{} {}{ENTRY_TERMINATOR}{}{ENTRY_TERMINATOR}{}{ENTRY_TERMINATOR}",
        event.formatted_timestamp(),
        event.origin_address,
        render_pairs(&event.query_parameters),
        render_pairs(&event.form_fields),
    )
}

pub fn render_pairs(params: &[Param]) -> String {
    params
        .iter()
        .map(Param::to_string)
        .collect::<Vec<_>>()
        .join("&")
}

/// Splits a raw `a=1&b=2` string into segments without decoding anything.
///
/// `render_pairs(&parse_pairs(raw)) == raw` holds for every input, including
/// bare keys and empty segments.
pub fn parse_pairs(raw: &str) -> Vec<Param> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split('&')
        .map(|segment| match segment.split_once('=') {
            Some((key, value)) => Param::new(key, value),
            None => Param::bare(segment),
        })
        .collect()
}

/// Decodes an `application/x-www-form-urlencoded` body and re-encodes each
/// name and value, so control bytes such as CR/LF only ever appear escaped.
pub fn encode_form(body: &[u8]) -> Vec<Param> {
    form_urlencoded::parse(body)
        .map(|(key, value)| {
            Param::new(
                form_urlencoded::byte_serialize(key.as_bytes()).collect::<String>(),
                form_urlencoded::byte_serialize(value.as_bytes()).collect::<String>(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{encode_form, format_entry, parse_pairs, render_pairs, NotificationEvent, Param};
    use time::macros::datetime;

    fn pairs(items: &[(&str, &str)]) -> Vec<Param> {
        items.iter().map(|&(k, v)| Param::new(k, v)).collect()
    }

    #[test]
    fn renders_pairs_joined_by_ampersand() {
        assert_eq!(render_pairs(&pairs(&[("a", "1"), ("b", "2")])), "a=1&b=2");
        assert_eq!(render_pairs(&[]), "");
    }

    #[test]
    fn formats_authorisation_callback() {
        let event = NotificationEvent::new(datetime!(2024-01-01 0:00 UTC), "203.0.113.5")
            .with_query([("status", "authorised")]);

        assert_eq!(
            format_entry(&event),
            "2024-01-01T00:00:00 203.0.113.5\r\nstatus=authorised\r\n\r\n"
        );
    }

    #[test]
    fn empty_lists_still_produce_lines() {
        let event = NotificationEvent::new(datetime!(2023-06-15 13:45:09.250 UTC), "");
        assert_eq!(format_entry(&event), "2023-06-15T13:45:09 \r\n\r\n\r\n");
    }

    #[test]
    fn formatting_is_repeatable() {
        let event = NotificationEvent::new(datetime!(2024-03-01 8:30 UTC), "10.0.0.1")
            .with_query(pairs(&[("merchantReference", "order-17")]))
            .with_form(pairs(&[("eventCode", "AUTHORISATION"), ("success", "true")]));

        assert_eq!(format_entry(&event), format_entry(&event.clone()));
        assert!(format_entry(&event).ends_with("eventCode=AUTHORISATION&success=true\r\n"));
    }

    #[test]
    fn parse_pairs_keeps_wire_encoding_and_order() {
        assert_eq!(
            parse_pairs("b=2&a=hello%20world&flag&c="),
            vec![
                Param::new("b", "2"),
                Param::new("a", "hello%20world"),
                Param::bare("flag"),
                Param::new("c", ""),
            ]
        );
        assert!(parse_pairs("").is_empty());
    }

    #[test]
    fn parse_then_render_is_identity() {
        for raw in ["a=1&b=2", "flag", "flag=", "a=1&&b=2", "a=1&", "&a", "=x", "a=b=c", "&"] {
            assert_eq!(render_pairs(&parse_pairs(raw)), raw, "input {raw:?}");
        }
    }

    #[test]
    fn encode_form_escapes_line_breaks() {
        let params = encode_form(b"x=1\r\n2099-01-01T00:00:00 6.6.6.6\r\nforged=yes\r\n");
        assert_eq!(params.len(), 1);

        let rendered = render_pairs(&params);
        assert!(!rendered.contains('\r') && !rendered.contains('\n'));
        assert_eq!(
            rendered,
            "x=1%0D%0A2099-01-01T00%3A00%3A00+6.6.6.6%0D%0Aforged%3Dyes%0D%0A"
        );
    }

    #[test]
    fn encode_form_keeps_ordinary_bodies_readable() {
        assert_eq!(
            render_pairs(&encode_form(b"eventCode=AUTHORISATION&reason=ok%20now&success=true")),
            "eventCode=AUTHORISATION&reason=ok+now&success=true"
        );
        assert!(encode_form(b"").is_empty());
    }
}
