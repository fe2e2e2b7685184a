use std::io::Cursor;

use aseflat_common::BufferStream;
use aseflat_common_test::init_logger;
use bytes::BufMut;
use derive_builder::Builder;

use crate::decode::chunk_type::{CEL, LAYER, OLD_PALETTE, PALETTE};
use crate::decode::{AseDecoder, AseHeader, AsePrim, ChunkType, ContainerDecoder, FrameHeader, HeaderFlags};
use crate::delegate::{DecodeDelegate, SpriteDelegate};
use crate::doc::Sprite;
use crate::{Config, Error, Raster, Reader};

use super::{write_test_cel, write_test_chunk, write_test_layer, write_test_old_palette, write_test_palette, TestCelData};

#[derive(Builder)]
#[builder(name = "TestAseBuilder", build_fn(name = "build_spec"))]
pub struct TestAseSpec {
    #[builder(default)]
    header: TestHeaderSpecBuilder,

    #[builder(default, setter(into, each(name = "add_frame")))]
    frames: Vec<TestFrameSpecBuilder>,
}

#[derive(Builder)]
pub struct TestHeaderSpec {
    #[builder(default = "AseHeader::MAGIC")]
    pub magic: u16,

    /// Defaults to the number of frames added.
    #[builder(default)]
    pub frames: Option<u16>,

    #[builder(default = "4")]
    pub width: u16,

    #[builder(default = "4")]
    pub height: u16,

    #[builder(default = "32")]
    pub color_depth: u16,

    #[builder(default = "HeaderFlags::LAYER_OPACITY_VALID | HeaderFlags::GROUP_OPACITY_VALID")]
    pub flags: HeaderFlags,

    #[builder(default)]
    pub transparent_index: u8,

    #[builder(default)]
    pub num_colors: u16,
}

#[derive(Builder)]
pub struct TestFrameSpec {
    #[builder(default = "100")]
    pub duration_ms: u16,

    /// Defaults to the encoded length of the frame.
    #[builder(default)]
    pub size: Option<u32>,

    #[builder(default, setter(into, each(name = "add_chunk")))]
    pub chunks: Vec<(ChunkType, Vec<u8>)>,
}

#[derive(Clone)]
pub struct TestAse {
    pub data: Vec<u8>,
}

//
// TestAseBuilder impls
//

impl TestAseBuilder {
    pub fn build(&self) -> TestAse {
        self.build_spec().unwrap().build()
    }
}

impl TestAseSpec {
    pub fn build(&self) -> TestAse {
        init_logger();

        let header = self.header.build().unwrap();
        let mut data = vec![];
        data.put_u32_le(0);
        data.put_u16_le(header.magic);
        data.put_u16_le(header.frames.unwrap_or(self.frames.len() as u16));
        data.put_u16_le(header.width);
        data.put_u16_le(header.height);
        data.put_u16_le(header.color_depth);
        data.put_u32_le(header.flags.bits());
        data.put_u16_le(100);
        data.extend_from_slice(&[0; 8]);
        data.put_u8(header.transparent_index);
        data.extend_from_slice(&[0; 3]);
        data.put_u16_le(header.num_colors);
        data.put_u8(1);
        data.put_u8(1);
        data.resize(AseHeader::ENCODED_LEN as usize, 0);

        for frame in &self.frames {
            let frame = frame.build().unwrap();
            let mut chunks = vec![];
            for (chunk_type, chunk_data) in &frame.chunks {
                write_test_chunk(&mut chunks, chunk_type.0, chunk_data);
            }
            let size = frame.size.unwrap_or(FrameHeader::ENCODED_LEN + chunks.len() as u32);
            data.put_u32_le(size);
            data.put_u16_le(FrameHeader::MAGIC);
            data.put_u16_le(frame.chunks.len() as u16);
            data.put_u16_le(frame.duration_ms);
            data.extend_from_slice(&[0; 2]);
            data.put_u32_le(frame.chunks.len() as u32);
            data.extend_from_slice(&chunks);
        }

        let file_size = data.len() as u32;
        (&mut data[..4]).put_u32_le(file_size);
        TestAse { data }
    }
}

//
// TestFrameSpecBuilder impls
//

impl TestFrameSpecBuilder {
    pub fn add_layer(
        &mut self,
        flags: u16,
        layer_type: u16,
        child_level: u16,
        blend_mode: u16,
        opacity: u8,
        name: &str,
    ) -> &mut Self {
        let mut data = vec![];
        write_test_layer(&mut data, flags, layer_type, child_level, blend_mode, opacity, name);
        self.add_chunk((LAYER, data))
    }

    pub fn add_cel(&mut self, layer: u16, x: i16, y: i16, opacity: u8, cel_data: TestCelData) -> &mut Self {
        let mut data = vec![];
        write_test_cel(&mut data, layer, x, y, opacity, cel_data);
        self.add_chunk((CEL, data))
    }

    pub fn add_palette(&mut self, size: u32, first: u32, entries: &[[u8; 4]]) -> &mut Self {
        let mut data = vec![];
        write_test_palette(&mut data, size, first, entries);
        self.add_chunk((PALETTE, data))
    }

    pub fn add_old_palette(&mut self, packets: &[(u8, Vec<[u8; 3]>)]) -> &mut Self {
        let mut data = vec![];
        write_test_old_palette(&mut data, packets);
        self.add_chunk((OLD_PALETTE, data))
    }
}

//
// TestAse impls
//

impl TestAse {
    pub fn stream(&self) -> BufferStream {
        BufferStream::new(self.data.clone())
    }

    /// Decode with the default decoder and delegate, returning the sprite.
    pub fn decode(&self) -> Result<Sprite, Error> {
        let mut delegate = SpriteDelegate::new();
        AseDecoder::default().decode(&mut self.stream(), &mut delegate)?;
        Ok(delegate.take_sprite().unwrap())
    }

    /// Run the whole pipeline on this file.
    pub fn open(&self) -> Result<Raster, Error> {
        self.open_with_config(Config::default())
    }

    pub fn open_with_config(&self, config: Config) -> Result<Raster, Error> {
        let result = Reader::with_config(config).open(Cursor::new(&self.data[..]));
        if let Err(err) = &result {
            log::info!("reader rejected file: {err}\n{err:?}");
        }
        result
    }
}
