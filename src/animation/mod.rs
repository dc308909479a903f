//! Animation playback, recording and video assembly.
//!
//! Two ways of moving through a trajectory:
//!
//! - [`PlaybackEngine`]: interactive looping playback. A background thread
//!   advances the step counter at the frame rate and posts redraws.
//! - [`RecordingPipeline`]: captures exactly one image per step by posting
//!   capture/advance pairs to the GUI thread, after which an [`Assembler`]
//!   turns the images into a video.
//!
//! # Files
//!
//! ```text
//! <output_dir>/temp_video/frame_0.png   captured frames (removed after assembly
//! <output_dir>/temp_video/frame_1.png   unless run files are kept)
//! ...
//! <output_dir>/ZnVis-Video.<format>     assembled video
//! ```

mod assembler;
mod playback;
mod recorder;

pub use assembler::{
    Assembler, AssemblyStats, FFMPEG_ENV, frame_index, order_frames, sorted_frames,
};
pub use playback::{PlaybackEngine, PlaybackState, RedrawFn};
pub use recorder::{
    AdvanceFn, ProgressFn, RecorderConfig, RecordingPipeline, RecordingStats, frame_file_name,
};
