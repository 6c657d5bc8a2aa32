pub mod image;
pub mod quarantine;

pub use image::ImageRepository;
pub use quarantine::QuarantineRepository;

use rusqlite::Connection;

pub trait Repository {
    fn conn(&self) -> &Connection;
}
