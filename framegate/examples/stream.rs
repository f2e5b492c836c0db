use std::sync::atomic::AtomicBool;

use framegate::virtual_camera::{VirtualCameraConfig, VirtualSystem};
use framegate::{
    acquire_device, run_stream, CaptureSettings, Exposure, PixelFormat, PngSink, RetryBudget,
    StreamOptions,
};

pub fn main() {
    let mut system = VirtualSystem::new(VirtualCameraConfig::default());
    let mut camera =
        acquire_device(&mut system, RetryBudget::default(), |_| {}).expect("No cameras found");

    let settings = CaptureSettings {
        pixel_format: PixelFormat::Mono8,
        exposure: Exposure::Micros(10_000.0),
        frame_rate: None,
        ..CaptureSettings::default()
    };
    settings.apply(&mut camera).expect("configuring camera");

    let mut sink = PngSink::new("camera_frames", "camera_frame").expect("creating output dir");
    let options = StreamOptions {
        max_frames: Some(10),
        expected_format: Some(settings.pixel_format),
        ..StreamOptions::default()
    };

    let summary = run_stream(&mut camera, &options, &mut sink, &AtomicBool::new(false))
        .expect("stream failed");
    println!("{} frames saved to {}", summary.delivered, sink.dir().display());
}
