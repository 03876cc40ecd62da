pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;
pub use tokio::sync::broadcast;

pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::devices::{ChannelValue, N2kDeviceType, N2kDevices};
pub use crate::error::ParseError;
pub use crate::file_error;
pub use crate::options::Options;
