//! Raw microscope image lookup, cropping and compositing.
//!
//! Image file stems end in `_<fov_number>`; the third `_`-separated token
//! names the light channel:
//!
//! ```text
//! S12_L3_01_x_8.jpeg    white light, FOV 8
//! S12_L3_02_x_8.jpeg    red light,   FOV 8
//! ```

use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ImageryError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("nothing to combine")]
    EmptyComposite,
}

pub type Result<T> = std::result::Result<T, ImageryError>;

/// Light channel of a raw image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    White,
    Red,
}

impl Channel {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "01" => Some(Self::White),
            "02" => Some(Self::Red),
            _ => None,
        }
    }
}

/// Composite direction for [`combine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Horizontal,
    Vertical,
}

/// Finds raw images by FOV number and channel.
#[derive(Debug, Clone)]
pub struct ImageLocator {
    extensions: Vec<String>,
}

impl ImageLocator {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
        }
    }

    /// FOV number and channel encoded in an image file name.
    pub fn parse_name(&self, path: &Path) -> Option<(u32, Option<Channel>)> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if !self.extensions.contains(&ext) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let fov_number = stem.rsplit('_').next()?.parse().ok()?;
        let channel = stem.split('_').nth(2).and_then(Channel::from_token);
        Some((fov_number, channel))
    }

    fn scan<'a>(
        &'a self,
        dir: &Path,
        fov_number: u32,
    ) -> impl Iterator<Item = (PathBuf, Option<Channel>)> + 'a {
        WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(move |e| {
                let (fov, channel) = self.parse_name(e.path())?;
                (fov == fov_number).then(|| (e.into_path(), channel))
            })
    }

    /// White and red images of one FOV under a sample directory.
    ///
    /// When several files match a channel the first in path order wins.
    pub fn white_red_pair(
        &self,
        sample_dir: &Path,
        fov_number: u32,
    ) -> (Option<PathBuf>, Option<PathBuf>) {
        let mut white = None;
        let mut red = None;
        for (path, channel) in self.scan(sample_dir, fov_number) {
            match channel {
                Some(Channel::White) if white.is_none() => white = Some(path),
                Some(Channel::Red) if red.is_none() => red = Some(path),
                _ => {}
            }
        }
        (white, red)
    }

    /// Every white image of one FOV under a state directory, across foils.
    pub fn white_images(&self, state_dir: &Path, fov_number: u32) -> Vec<PathBuf> {
        self.scan(state_dir, fov_number)
            .filter(|(_, channel)| *channel == Some(Channel::White))
            .map(|(path, _)| path)
            .collect()
    }
}

pub fn load(path: &Path) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Pixel window of a crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Square window of side `2 * half_size` centered on `(x, y)`.
///
/// Near an edge the window is shifted inward so it keeps its size; it only
/// shrinks when the image itself is smaller.
pub fn crop_window(image_width: u32, image_height: u32, x: f64, y: f64, half_size: f64) -> CropWindow {
    let side = (2.0 * half_size).round().max(1.0);
    let axis = |center: f64, extent: u32| {
        let size = side.min(f64::from(extent)) as u32;
        let max_start = extent - size;
        let start = (center - half_size).round().clamp(0.0, f64::from(max_start)) as u32;
        (start, size)
    };
    let (x0, width) = axis(x, image_width);
    let (y0, height) = axis(y, image_height);
    CropWindow {
        x: x0,
        y: y0,
        width,
        height,
    }
}

pub fn crop_around(image: &RgbImage, x: f64, y: f64, half_size: f64) -> RgbImage {
    let w = crop_window(image.width(), image.height(), x, y, half_size);
    imageops::crop_imm(image, w.x, w.y, w.width, w.height).to_image()
}

/// Concatenate images, padding with black to the largest extent.
pub fn combine(images: &[RgbImage], direction: Direction) -> Result<RgbImage> {
    if images.is_empty() {
        return Err(ImageryError::EmptyComposite);
    }

    let (width, height) = match direction {
        Direction::Horizontal => (
            images.iter().map(|i| i.width()).sum(),
            images.iter().map(|i| i.height()).max().unwrap_or(0),
        ),
        Direction::Vertical => (
            images.iter().map(|i| i.width()).max().unwrap_or(0),
            images.iter().map(|i| i.height()).sum(),
        ),
    };

    let mut canvas = RgbImage::new(width, height);
    let mut offset = 0i64;
    for img in images {
        match direction {
            Direction::Horizontal => {
                imageops::replace(&mut canvas, img, offset, 0);
                offset += i64::from(img.width());
            }
            Direction::Vertical => {
                imageops::replace(&mut canvas, img, 0, offset);
                offset += i64::from(img.height());
            }
        }
    }
    Ok(canvas)
}

/// Lay images out row-major in equal cells sized to the largest image.
/// Missing cells stay black.
pub fn grid(images: &[RgbImage], columns: u32) -> Result<RgbImage> {
    if images.is_empty() || columns == 0 {
        return Err(ImageryError::EmptyComposite);
    }

    let cell_w = images.iter().map(|i| i.width()).max().unwrap_or(0);
    let cell_h = images.iter().map(|i| i.height()).max().unwrap_or(0);
    let rows = (images.len() as u32).div_ceil(columns);

    let mut canvas = RgbImage::new(cell_w * columns, cell_h * rows);
    for (i, img) in images.iter().enumerate() {
        let col = i as u32 % columns;
        let row = i as u32 / columns;
        imageops::replace(
            &mut canvas,
            img,
            i64::from(col * cell_w),
            i64::from(row * cell_h),
        );
    }
    Ok(canvas)
}

pub fn resize_to_width(image: &RgbImage, width: u32) -> RgbImage {
    if image.width() == 0 || width == 0 || image.width() == width {
        return image.clone();
    }
    let scale = f64::from(width) / f64::from(image.width());
    let height = (f64::from(image.height()) * scale).round().max(1.0) as u32;
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Draw a rectangle outline, clipped to the image.
pub fn outline(image: &mut RgbImage, window: CropWindow, color: [u8; 3], thickness: u32) {
    let (w, h) = image.dimensions();
    let x_end = window.x.saturating_add(window.width).min(w);
    let y_end = window.y.saturating_add(window.height).min(h);
    let t = thickness.max(1);

    for y in window.y..y_end {
        for x in window.x..x_end {
            let on_edge = x < window.x + t
                || y < window.y + t
                || x + t >= window.x + window.width
                || y + t >= window.y + window.height;
            if on_edge {
                image.put_pixel(x, y, Rgb(color));
            }
        }
    }
}

/// Save as PNG under `dir`, creating it. Returns the written path.
pub fn save_png(image: &RgbImage, dir: &Path, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|source| ImageryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = png_path(dir, name);
    image.save(&path)?;
    Ok(path)
}

/// Where [`save_png`] writes an image called `name`.
pub fn png_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.png", sanitize_file_name(name)))
}

/// Replace characters that are not allowed in file names.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\n' => '_',
            c => c,
        })
        .collect()
}
