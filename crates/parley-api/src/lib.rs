pub mod uploads;

pub use uploads::{MAX_UPLOAD_BODY, upload};
