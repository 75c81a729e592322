pub mod completions;
pub mod options;
pub mod play;
pub mod topology;
pub mod util;
