// V4L2 radio ioctl bindings. Layouts follow <linux/videodev2.h>.

pub const V4L2_CAP_TUNER: u32 = 0x0001_0000;
pub const V4L2_TUNER_CAP_STEREO: u32 = 0x0010;
pub const V4L2_TUNER_RADIO: u32 = 1;
pub const V4L2_TUNER_MODE_MONO: u32 = 0;
pub const V4L2_TUNER_MODE_STEREO: u32 = 1;

pub const V4L2_CID_AUDIO_VOLUME: u32 = 0x0098_0905;
pub const V4L2_CID_TUNE_DEEMPHASIS: u32 = 0x00a1_0901;
pub const V4L2_DEEMPHASIS_50_US: i32 = 1;
pub const V4L2_DEEMPHASIS_75_US: i32 = 2;

/// Tuner index; radio nodes expose exactly one.
pub const TUNER_INDEX: u32 = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Capability {
    pub driver: [u8; 16],
    pub card: [u8; 32],
    pub bus_info: [u8; 32],
    pub version: u32,
    pub capabilities: u32,
    pub device_caps: u32,
    pub reserved: [u32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Tuner {
    pub index: u32,
    pub name: [u8; 32],
    pub kind: u32,
    pub capability: u32,
    pub rangelow: u32,
    pub rangehigh: u32,
    pub rxsubchans: u32,
    pub audmode: u32,
    pub signal: i32,
    pub afc: i32,
    pub reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Frequency {
    pub tuner: u32,
    pub kind: u32,
    pub frequency: u32,
    pub reserved: [u32; 8],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2HwFreqSeek {
    pub tuner: u32,
    pub kind: u32,
    pub seek_upward: u32,
    pub wrap_around: u32,
    pub spacing: u32,
    pub rangelow: u32,
    pub rangehigh: u32,
    pub reserved: [u32; 5],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Control {
    pub id: u32,
    pub value: i32,
}

nix::ioctl_read!(vidioc_querycap, b'V', 0, V4l2Capability);
nix::ioctl_readwrite!(vidioc_g_ctrl, b'V', 27, V4l2Control);
nix::ioctl_readwrite!(vidioc_s_ctrl, b'V', 28, V4l2Control);
nix::ioctl_readwrite!(vidioc_g_tuner, b'V', 29, V4l2Tuner);
nix::ioctl_write_ptr!(vidioc_s_tuner, b'V', 30, V4l2Tuner);
nix::ioctl_readwrite!(vidioc_g_frequency, b'V', 56, V4l2Frequency);
nix::ioctl_write_ptr!(vidioc_s_frequency, b'V', 57, V4l2Frequency);
nix::ioctl_write_ptr!(vidioc_s_hw_freq_seek, b'V', 82, V4l2HwFreqSeek);

/// Read a NUL-terminated byte field as a string.
pub fn c_field(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
