use std::fs;
use std::io;
use std::io::Read;
use std::path::Path;

use libflate::gzip;

//
// public types
//

/// What a test file under `test-data/` is expected to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestType {
    /// A well-formed sprite which must flatten.
    Valid,
    /// A sprite carrying the right signature but broken contents, which must be rejected by the decoder.
    Invalid,
    /// A file of some other format, which must be rejected by sniffing.
    Foreign,
}

//
// private types
//

struct TestDirSpec {
    path: &'static str,
    test_type: TestType,
}

macro_rules! test_dir {
    ($name:literal, $test_type:ident) => {
        $crate::TestDirSpec {
            path: concat!(env!("CARGO_MANIFEST_DIR"), "/../test-data/", $name),
            test_type: TestType::$test_type,
        }
    };
}

const TEST_DATA_DIRS: &[TestDirSpec] = &[
    test_dir!("valid", Valid),
    test_dir!("invalid", Invalid),
    test_dir!("foreign", Foreign),
];

//
// public functions
//

pub fn init_logger() {
    // Tests race to install the logger; only the first one wins.
    let _ignore = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .is_test(true)
        .try_init();
}

/// Run `check` over every file in the `test-data/` directories, gunzipping `.gz` files first.
///
/// Files under `foreign/` are visited regardless of extension; elsewhere only files ending in one of `exts` (or
/// `<ext>.gz`) are. Missing directories are skipped.
pub fn test_data<F: FnMut(TestType, &[u8])>(exts: &[&str], mut check: F) {
    init_logger();
    for dir_spec in TEST_DATA_DIRS {
        let dir_entries = match fs::read_dir(dir_spec.path) {
            Ok(dir_entries) => dir_entries,
            Err(err) => match err.kind() {
                io::ErrorKind::NotFound => continue,
                _ => panic!("could not read test data directory: {err}"),
            },
        };

        for dir_entry in dir_entries.map(Result::unwrap) {
            let path = dir_entry.path();
            let Some(data) = load(&path, dir_spec.test_type, exts) else {
                continue;
            };
            let file_name = dir_entry.file_name();
            match dir_spec.test_type {
                TestType::Valid => log::info!("running test on valid input: {file_name:?}"),
                TestType::Invalid => log::info!("running test on invalid input: {file_name:?}"),
                TestType::Foreign => log::info!("running test on foreign input: {file_name:?}"),
            }
            check(dir_spec.test_type, &data[..]);
        }
    }
}

//
// private functions
//

fn load(path: &Path, test_type: TestType, exts: &[&str]) -> Option<Vec<u8>> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let gzipped = name.ends_with(".gz");
    let stem = name.trim_end_matches(".gz");
    let wanted = test_type == TestType::Foreign || exts.iter().any(|ext| stem.ends_with(ext));
    if !wanted || !path.is_file() {
        return None;
    }
    let data = fs::read(path).unwrap();
    Some(if gzipped { gunzip(&data) } else { data })
}

fn gunzip(input: &[u8]) -> Vec<u8> {
    let mut decoder = gzip::Decoder::new(input).unwrap();
    let mut data = Vec::new();
    decoder.read_to_end(&mut data).unwrap();
    data
}
