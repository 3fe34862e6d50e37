mod encoder;
mod error;
mod event;
mod store;

pub use encoder::{CustomField, JsonEncoder};
pub use error::{RecorderError, Result};
pub use event::{
    encode_form, format_entry, parse_pairs, render_pairs, NotificationEvent, Param,
    ENTRY_TERMINATOR,
};
pub use store::{LogStore, RecordedEntry, Recorder};
