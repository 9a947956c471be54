//! Classlists: the ordered record of classes loaded during a training run.
//!
//! - [`ClassListRecorder`] observes load events and produces a [`ClassList`].
//! - [`ClassList`] reads and writes the line-oriented classlist file.
//! - [`convert`] applies a [`SelectionPolicy`] to pick the classes worth
//!   sharing.

mod convert;
mod error;
mod record;
mod recorder;

pub use convert::{convert, convert_list, SelectionPolicy};
pub use error::ClassListError;
pub use record::{ClassList, ClassRecord, DefiningLoader};
pub use recorder::{ClassListRecorder, ClassLoadEvent, UNKNOWN_ORIGIN};
