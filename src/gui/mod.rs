//! Terminal screens for the monitor.

mod device_selector;
mod error;
mod pressure_view;

pub use device_selector::{device_selector, link_choices, LinkChoice};
pub use error::{join_worker, GuiError};
pub use pressure_view::{heat_color, heatmap_lines, pressure_view, ViewSummary};
