pub mod clock;
pub mod event;
pub mod record;
pub mod version;

pub use clock::{Clock, SystemClock};
pub use event::{DownloadEvent, EventError};
pub use record::{PackageInfo, StatsRecord};
pub use version::normalize_version;
