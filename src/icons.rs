use std::path::Path;

#[cfg(windows)]
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Produces display icons for executables as `data:` URLs.
pub trait IconSource: Send + Sync + 'static {
    fn icon_for(&self, path: &Path) -> Option<String>;
}

/// Icons read from the executable's embedded resources.
#[derive(Debug, Default)]
pub struct SystemIcons;

impl IconSource for SystemIcons {
    fn icon_for(&self, path: &Path) -> Option<String> {
        if !path.is_file() {
            return None;
        }
        #[cfg(windows)]
        {
            let png = win::extract_large_icon_png(path)?;
            Some(png_data_url(&png))
        }
        #[cfg(not(windows))]
        {
            None
        }
    }
}

#[cfg(windows)]
fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", BASE64.encode(png))
}

/// Converts a bottom-up BGRA buffer into top-down RGBA and encodes it as PNG.
#[cfg_attr(not(windows), allow(dead_code))]
fn encode_bgra_png(bgra: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let stride = width as usize * 4;
    if width == 0 || height == 0 || bgra.len() < stride * height as usize {
        return None;
    }

    let has_alpha = bgra.chunks_exact(4).any(|px| px[3] != 0);
    let mut rgba = Vec::with_capacity(stride * height as usize);
    for row in bgra.chunks_exact(stride).take(height as usize).rev() {
        for px in row.chunks_exact(4) {
            let alpha = if has_alpha { px[3] } else { 0xff };
            rgba.extend_from_slice(&[px[2], px[1], px[0], alpha]);
        }
    }

    let image = image::RgbaImage::from_raw(width, height, rgba)?;
    let mut out = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut out, image::ImageOutputFormat::Png)
        .ok()?;
    Some(out.into_inner())
}

#[cfg(windows)]
mod win {
    use std::{ffi::c_void, mem, path::Path, ptr};

    use windows::{
        core::PCWSTR,
        Win32::{
            Foundation::HWND,
            Graphics::Gdi::{
                DeleteObject, GetDC, GetDIBits, GetObjectW, ReleaseDC, BITMAP, BITMAPINFO,
                BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
            },
            UI::{
                Shell::ExtractIconExW,
                WindowsAndMessaging::{DestroyIcon, GetIconInfo, HICON, ICONINFO},
            },
        },
    };

    use crate::windows_utils::os_str_to_wide;

    pub(super) fn extract_large_icon_png(path: &Path) -> Option<Vec<u8>> {
        let wide = os_str_to_wide(path.as_os_str());
        let mut large = HICON::default();
        let extracted =
            unsafe { ExtractIconExW(PCWSTR(wide.as_ptr()), 0, Some(&mut large as *mut HICON), None, 1) };
        if extracted == 0 || large.is_invalid() {
            return None;
        }
        let png = icon_to_png(large);
        unsafe {
            let _ = DestroyIcon(large);
        }
        png
    }

    fn icon_to_png(icon: HICON) -> Option<Vec<u8>> {
        let mut info = ICONINFO::default();
        unsafe { GetIconInfo(icon, &mut info).ok()? };

        let result = unsafe {
            let mut bitmap = BITMAP::default();
            let got = GetObjectW(
                info.hbmColor,
                mem::size_of::<BITMAP>() as i32,
                Some(&mut bitmap as *mut BITMAP as *mut c_void),
            );
            if got == 0 || bitmap.bmWidth <= 0 || bitmap.bmHeight <= 0 {
                None
            } else {
                let width = bitmap.bmWidth as u32;
                let height = bitmap.bmHeight as u32;
                let mut header = BITMAPINFO::default();
                header.bmiHeader = BITMAPINFOHEADER {
                    biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width as i32,
                    biHeight: height as i32,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                };
                let mut pixels = vec![0u8; (width * height * 4) as usize];
                let hdc = GetDC(HWND(ptr::null_mut()));
                let lines = GetDIBits(
                    hdc,
                    info.hbmColor,
                    0,
                    height,
                    Some(pixels.as_mut_ptr().cast()),
                    &mut header,
                    DIB_RGB_COLORS,
                );
                ReleaseDC(HWND(ptr::null_mut()), hdc);
                if lines == 0 {
                    None
                } else {
                    super::encode_bgra_png(&pixels, width, height)
                }
            }
        };

        unsafe {
            let _ = DeleteObject(info.hbmColor);
            let _ = DeleteObject(info.hbmMask);
        }
        result
    }
}
