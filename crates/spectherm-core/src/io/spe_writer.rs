use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use ndarray::ArrayView2;

use crate::error::{Result, SpectraError};
use crate::frame::encode_frame;
use crate::io::spe::{
    SpeHeader, OFFSET_DATATYPE, OFFSET_HEADER_VERSION, OFFSET_MAGIC, OFFSET_NUM_FRAMES,
    OFFSET_POLYNOM_COEFFS, OFFSET_POLYNOM_ORDER, OFFSET_XDIM, OFFSET_XML_FOOTER, OFFSET_YDIM,
    SPE_HEADER_SIZE, SPE_MAGIC,
};

/// Writes a complete SPE file: header, frames in order, then the optional XML footer.
pub struct SpeWriter {
    writer: BufWriter<File>,
    header: SpeHeader,
    footer: Option<String>,
    frame_buf: Vec<u8>,
    frames_written: u32,
}

impl SpeWriter {
    /// Create a new SPE file and write the header.
    ///
    /// When a footer is given the header's XML offset points just past the last frame.
    pub fn create(path: &Path, header: &SpeHeader, footer: Option<&str>) -> Result<Self> {
        let mut header = header.clone();
        header.xml_offset = if footer.is_some() {
            header.data_end() as u64
        } else {
            0
        };

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&encode_header(&header))?;
        Ok(Self {
            writer,
            frame_buf: vec![0u8; header.frame_byte_size()],
            header,
            footer: footer.map(str::to_owned),
            frames_written: 0,
        })
    }

    /// Append the next frame, encoded in the header's sample type.
    pub fn write_frame(&mut self, data: ArrayView2<f64>) -> Result<()> {
        let expected = (self.header.height as usize, self.header.width as usize);
        if data.dim() != expected {
            return Err(SpectraError::ShapeMismatch(format!(
                "frame is {:?}, header declares {:?}",
                data.dim(),
                expected
            )));
        }
        if self.frames_written >= self.header.frame_count {
            return Err(SpectraError::FrameIndexOutOfRange {
                index: self.frames_written as usize,
                total: self.header.frame_count as usize,
            });
        }
        encode_frame(data, self.header.sample_type, &mut self.frame_buf);
        self.writer.write_all(&self.frame_buf)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Write the footer and flush. Every declared frame must have been written.
    pub fn finalize(mut self) -> Result<()> {
        if self.frames_written != self.header.frame_count {
            return Err(SpectraError::InvalidSpe(format!(
                "wrote {} of {} frames",
                self.frames_written, self.header.frame_count
            )));
        }
        if let Some(footer) = self.footer.take() {
            self.writer.write_all(footer.as_bytes())?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

pub(crate) fn encode_header(header: &SpeHeader) -> Vec<u8> {
    let mut buf = vec![0u8; SPE_HEADER_SIZE];
    LittleEndian::write_u16(&mut buf[OFFSET_XDIM..], header.width);
    LittleEndian::write_i16(&mut buf[OFFSET_DATATYPE..], header.sample_type.spe_code());
    LittleEndian::write_u16(&mut buf[OFFSET_YDIM..], header.height);
    LittleEndian::write_u64(&mut buf[OFFSET_XML_FOOTER..], header.xml_offset);
    LittleEndian::write_i32(&mut buf[OFFSET_NUM_FRAMES..], header.frame_count as i32);
    LittleEndian::write_f32(&mut buf[OFFSET_HEADER_VERSION..], header.header_version);
    LittleEndian::write_i32(&mut buf[OFFSET_MAGIC..], SPE_MAGIC);
    buf[OFFSET_POLYNOM_ORDER] = header.polynom_order;
    LittleEndian::write_f64_into(
        &header.polynom_coeffs,
        &mut buf[OFFSET_POLYNOM_COEFFS..OFFSET_POLYNOM_COEFFS + 8 * header.polynom_coeffs.len()],
    );
    buf
}
