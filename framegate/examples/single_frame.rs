use framegate::virtual_camera::{VirtualCameraConfig, VirtualSystem};
use framegate::{
    acquire_device, open_stream, CaptureSettings, ChannelOrder, Device, RetryBudget,
};

pub fn main() {
    let mut system = VirtualSystem::new(VirtualCameraConfig::default());
    let mut camera =
        acquire_device(&mut system, RetryBudget::default(), |_| {}).expect("No cameras found");

    println!("camera info:\n{:#?}\n", camera.info());

    let applied = CaptureSettings::default()
        .apply(&mut camera)
        .expect("configuring camera");
    println!("applied settings:\n{:#?}\n", applied);

    let mut stream = open_stream(&mut camera, 1).expect("starting stream");
    let frame = stream.grab(None).expect("getting frame");
    stream.stop().expect("stopping stream");

    println!("frame shape (h, w, c): {:?}", frame.shape());
    frame
        .save_png("camera_frame.png", ChannelOrder::Rgb)
        .expect("saving to file failed");
}
