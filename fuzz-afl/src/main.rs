use std::io;

fn main() {
    afl::fuzz!(|data: &[u8]| {
        std::panic::set_hook(Box::new(|panic| {
            eprintln!("{panic}");
            std::process::abort();
        }));
        match aseflat::open(io::Cursor::new(data)) {
            Ok(raster) => {
                eprintln!(
                    "aseflat returned ok: {width}x{height} raster",
                    width = raster.width(),
                    height = raster.height(),
                );
            }
            Err(error) => match error {
                aseflat::Error::Stream(error) => match error.kind() {
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => {
                        eprintln!("aseflat returned an io error: {error}\n{error:?}");
                    }
                    _ => panic!(),
                },
                aseflat::Error::FormatMismatch => {}
                aseflat::Error::Decode(error) => {
                    eprintln!("aseflat returned a decode error: {error}\n{error:?}");
                }
                aseflat::Error::Composite(error) => {
                    eprintln!("aseflat returned a composite error: {error}\n{error:?}");
                }
                aseflat::Error::Internal(message) => panic!("{message}"),
            },
        }
    });
}
