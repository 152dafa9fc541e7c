pub mod codec;
pub mod config;
pub mod manager;
pub mod matting;
pub mod model;
pub mod server;
pub mod torch;
pub mod worker;

/// Shared helpers
pub mod util {
    use std::sync::{Mutex, MutexGuard};

    /// Lock a mutex, recovering the guard if a previous holder panicked
    pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fixtures shared by the unit tests
    #[cfg(test)]
    pub mod test {
        use crate::model::{BackgroundRemover, ModelLoader};
        use anyhow::{anyhow, Result};
        use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage, RgbaImage};
        use std::io::Cursor;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        pub const BOUNDARY: &str = "----rembgtestboundary";

        /// A small RGB gradient
        pub fn test_image(width: u32, height: u32) -> DynamicImage {
            DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
                Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 200])
            }))
        }

        pub fn encode(image: &DynamicImage, format: ImageOutputFormat) -> Vec<u8> {
            let mut bytes = Vec::new();
            image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
            bytes
        }

        pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
            encode(&test_image(width, height), ImageOutputFormat::Png)
        }

        pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
            encode(&test_image(width, height), ImageOutputFormat::Jpeg(90))
        }

        /// Build a multipart/form-data body holding one field
        pub fn multipart_body(name: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
            let disposition = match filename {
                Some(filename) => format!("form-data; name=\"{name}\"; filename=\"{filename}\""),
                None => format!("form-data; name=\"{name}\""),
            };
            let mut body = format!(
                "--{BOUNDARY}\r\nContent-Disposition: {disposition}\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .into_bytes();
            body.extend_from_slice(data);
            body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
            body
        }

        pub fn multipart_content_type() -> String {
            format!("multipart/form-data; boundary={BOUNDARY}")
        }

        /// Break `text` into lines of `width` characters, like MIME base64
        pub fn wrap_lines(text: &str, width: usize, newline: &str) -> String {
            text.as_bytes()
                .chunks(width)
                .map(|line| std::str::from_utf8(line).unwrap())
                .collect::<Vec<_>>()
                .join(newline)
        }

        /// Makes the left half of every image transparent
        pub struct HalfCutout;

        impl BackgroundRemover for HalfCutout {
            fn remove(&mut self, image: &DynamicImage) -> Result<RgbaImage> {
                let mut rgba = image.to_rgba8();
                let half = rgba.width() / 2;
                for (x, _, pixel) in rgba.enumerate_pixels_mut() {
                    if x < half {
                        pixel.0 = [0, 0, 0, 0];
                    }
                }
                Ok(rgba)
            }
        }

        /// Counts loads and can be told to fail them
        #[derive(Default)]
        pub struct FakeLoader {
            pub loads: AtomicUsize,
            pub failing_loads: AtomicUsize,
        }

        impl FakeLoader {
            pub fn new() -> Arc<Self> {
                Arc::new(Self::default())
            }

            /// Fail the next `n` loads
            pub fn failing(n: usize) -> Arc<Self> {
                let loader = Self::default();
                loader.failing_loads.store(n, Ordering::SeqCst);
                Arc::new(loader)
            }

            pub fn loads(&self) -> usize {
                self.loads.load(Ordering::SeqCst)
            }
        }

        impl ModelLoader for FakeLoader {
            fn load(&self) -> Result<Box<dyn BackgroundRemover>> {
                self.loads.fetch_add(1, Ordering::SeqCst);
                let failing = self.failing_loads.load(Ordering::SeqCst);
                if failing > 0 {
                    self.failing_loads.store(failing - 1, Ordering::SeqCst);
                    return Err(anyhow!("model file not found"));
                }
                Ok(Box::new(HalfCutout))
            }
        }
    }
}
