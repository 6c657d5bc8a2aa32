use crate::core::image::{ImageMetadata, TimestampSource};
use chrono::{DateTime, Local, NaiveDateTime};
use exif::{Exif, In, Reader, Tag, Value};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Tags tried in order for the capture timestamp.
const TIMESTAMP_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// Reads dimensions, capture time and camera identity from image files.
///
/// Never fails on missing or corrupt metadata: fields that cannot be
/// extracted are left as `None`. Only an unreadable file (no `stat`) is an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    pub fn read_metadata(&self, file_path: &Path) -> std::io::Result<ImageMetadata> {
        let file_metadata = fs::metadata(file_path)?;
        let mut metadata = ImageMetadata::bare(file_path, file_metadata.len());

        match image::image_dimensions(file_path) {
            Ok((width, height)) => {
                metadata.width = Some(width);
                metadata.height = Some(height);
            }
            Err(e) => log::debug!("No dimensions for {}: {}", file_path.display(), e),
        }

        if let Some(exif) = self.read_exif(file_path) {
            metadata.captured_at = self.capture_time(&exif);
            metadata.camera_make = self.string_field(&exif, Tag::Make);
            metadata.camera_model = self.string_field(&exif, Tag::Model);
        }

        if metadata.captured_at.is_some() {
            metadata.timestamp_source = Some(TimestampSource::Exif);
        } else if let Ok(modified) = file_metadata.modified() {
            let local: DateTime<Local> = modified.into();
            metadata.captured_at = Some(local.naive_local());
            metadata.timestamp_source = Some(TimestampSource::FileModified);
        }

        Ok(metadata)
    }

    fn read_exif(&self, file_path: &Path) -> Option<Exif> {
        let file = File::open(file_path).ok()?;
        let mut buf_reader = BufReader::new(file);
        match Reader::new().read_from_container(&mut buf_reader) {
            Ok(exif) => Some(exif),
            Err(e) => {
                log::debug!("No EXIF in {}: {}", file_path.display(), e);
                None
            }
        }
    }

    fn capture_time(&self, exif: &Exif) -> Option<NaiveDateTime> {
        TIMESTAMP_TAGS.iter().find_map(|&tag| {
            exif.get_field(tag, In::PRIMARY)
                .and_then(|field| field_to_string(&field.value))
                .and_then(|raw| parse_exif_datetime(&raw))
        })
    }

    fn string_field(&self, exif: &Exif, tag: Tag) -> Option<String> {
        exif.get_field(tag, In::PRIMARY)
            .and_then(|field| field_to_string(&field.value))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

fn field_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(vec) => vec.first().map(|ascii_val| {
            String::from_utf8_lossy(ascii_val)
                .trim_end_matches('\0')
                .to_string()
        }),
        Value::Undefined(data, _) => Some(
            String::from_utf8_lossy(data)
                .trim_end_matches('\0')
                .to_string(),
        ),
        _ => None,
    }
}

/// EXIF datetimes look like `YYYY:MM:DD HH:MM:SS`; a dashed date is accepted too.
pub fn parse_exif_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map_err(|_| log::warn!("Failed to parse EXIF datetime: {}", raw))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_parse_exif_datetime() {
        let parsed = parse_exif_datetime("2023:12:25 14:30:45").unwrap();
        assert_eq!(parsed.year(), 2023);
        assert_eq!(parsed.month(), 12);
        assert_eq!(parsed.day(), 25);
        assert_eq!(parsed.hour(), 14);
        assert_eq!(parsed.minute(), 30);
        assert_eq!(parsed.second(), 45);

        assert!(parse_exif_datetime("2023-12-25 14:30:45").is_some());
        assert!(parse_exif_datetime("0000:00:00 00:00:00").is_none());
        assert!(parse_exif_datetime("   ").is_none());
    }

    #[test]
    fn test_missing_file_is_error() {
        assert!(ExifService::new()
            .read_metadata(Path::new("/non/existent/file.jpg"))
            .is_err());
    }

    #[test]
    fn test_plain_png_falls_back_to_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("plain.png");
        RgbImage::from_pixel(40, 30, Rgb([10, 20, 30])).save(&path).unwrap();

        let metadata = ExifService::new().read_metadata(&path).unwrap();
        assert_eq!(metadata.width, Some(40));
        assert_eq!(metadata.height, Some(30));
        assert!(metadata.captured_at.is_some());
        assert_eq!(metadata.timestamp_source, Some(TimestampSource::FileModified));
        assert!(metadata.camera_make.is_none());
    }

    #[test]
    fn test_not_an_image_gives_partial_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.jpg");
        std::fs::write(&path, b"This is not an image file").unwrap();

        let metadata = ExifService::new().read_metadata(&path).unwrap();
        assert_eq!(metadata.file_size, 25);
        assert!(metadata.width.is_none());
        assert!(metadata.height.is_none());
        assert_eq!(metadata.format, "JPG");
    }
}
