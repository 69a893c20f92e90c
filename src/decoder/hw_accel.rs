//! Hardware acceleration attach shim
//!
//! Binds a configured hardware device to a video codec context before it is
//! opened. Only the attach step lives here; surface download and pixel
//! format negotiation happen on the render side.

use crate::container::HardwareDeviceInfo;
use crate::utils::error::{MediaCoreError, Result};
use ffmpeg_sys_next as ffi;
use std::ffi::CString;

/// Hardware accelerator bound to one video component
#[derive(Debug, Clone)]
pub struct HardwareAccelerator {
    /// Device type name as understood by FFmpeg ("cuda", "vaapi", ...)
    pub name: String,
}

impl HardwareAccelerator {
    /// Create the hardware device context and hang it off the codec context
    ///
    /// Called between codec selection and `avcodec_open2`. On failure the
    /// codec context is left untouched so software decoding can proceed.
    pub(crate) fn attach(
        codec_ctx: *mut ffi::AVCodecContext,
        device: &HardwareDeviceInfo,
    ) -> Result<HardwareAccelerator> {
        let type_name = CString::new(device.device_type.as_str())?;
        let device_path = device
            .device
            .as_deref()
            .map(CString::new)
            .transpose()?;

        unsafe {
            let device_type = ffi::av_hwdevice_find_type_by_name(type_name.as_ptr());
            if device_type == ffi::AVHWDeviceType::AV_HWDEVICE_TYPE_NONE {
                return Err(MediaCoreError::Container(format!(
                    "unknown hardware device type '{}'",
                    device.device_type
                )));
            }

            let mut hw_device_ctx: *mut ffi::AVBufferRef = std::ptr::null_mut();
            let ret = ffi::av_hwdevice_ctx_create(
                &mut hw_device_ctx,
                device_type,
                device_path
                    .as_ref()
                    .map_or(std::ptr::null(), |p| p.as_ptr()),
                std::ptr::null_mut(),
                0,
            );
            if ret < 0 {
                return Err(MediaCoreError::Container(format!(
                    "cannot create '{}' hardware device: {}",
                    device.device_type,
                    ffmpeg_next::Error::from(ret)
                )));
            }

            (*codec_ctx).hw_device_ctx = hw_device_ctx;
        }

        log::info!("attached '{}' hardware decoder", device.device_type);
        Ok(HardwareAccelerator {
            name: device.device_type.clone(),
        })
    }
}
