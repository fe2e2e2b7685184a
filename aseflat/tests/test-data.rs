use std::io::Cursor;

use aseflat::{open, Error};
use aseflat_common_test::{test_data, TestType};
use assert_matches::assert_matches;

#[test]
fn test_data_files() {
    test_data(&[".ase", ".aseprite"], |test_type, data| match test_type {
        TestType::Valid => {
            let raster = open(Cursor::new(data)).unwrap();
            assert_eq!(raster.pixels().len() as u64, u64::from(raster.width()) * u64::from(raster.height()) * 4);
        }
        TestType::Invalid => {
            let err = open(Cursor::new(data)).unwrap_err();
            log::info!("rejected: {err}\n{err:?}");
            assert_matches!(err, Error::Decode(_) | Error::Stream(_) | Error::Composite(_));
        }
        TestType::Foreign => {
            assert_matches!(open(Cursor::new(data)), Err(Error::FormatMismatch));
        }
    });
}
