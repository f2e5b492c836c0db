use std::sync::atomic::AtomicBool;

use framegate::virtual_camera::{VirtualCameraConfig, VirtualSystem};
use framegate::{
    acquire_device, from_fn, run_stream, CaptureSettings, Flow, FrameStats, MaterializedImage,
    RetryBudget, StreamOptions,
};

pub fn main() {
    let config = VirtualCameraConfig {
        realtime: true,
        ..VirtualCameraConfig::default()
    };
    let mut system = VirtualSystem::new(config);
    let mut camera =
        acquire_device(&mut system, RetryBudget::default(), |_| {}).expect("No cameras found");

    let settings = CaptureSettings {
        frame_rate: Some(30.0),
        ..CaptureSettings::default()
    };
    settings.apply(&mut camera).expect("configuring camera");

    let options = StreamOptions {
        max_frames: Some(300),
        timeout_ms: Some(1000),
        ..StreamOptions::default()
    };
    let mut sink = from_fn(|_: &MaterializedImage, stats: &FrameStats| {
        print!("{}    \r", stats.fps_label());
        Ok(Flow::Continue)
    });

    let summary = run_stream(&mut camera, &options, &mut sink, &AtomicBool::new(false))
        .expect("stream failed");
    println!("\nmean {:.2} fps", summary.mean_fps());
}
