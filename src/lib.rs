pub mod compose;
pub mod feed;
pub mod fetch;
pub mod fonts;
pub mod layout;
pub mod logging;
pub mod render;
pub mod scorer;
pub mod settings;
pub mod sheet;
pub mod social;
pub mod template;

pub use feed::{read_feed, Article};
pub use fetch::ImageFetcher;
pub use render::{run_batch, BatchSummary, CardRenderer, RenderMode, RenderOptions};
pub use settings::{load_settings, Settings};
pub use template::{PlaceholderRect, Template};

#[cfg(test)]
pub(crate) mod test_util;
