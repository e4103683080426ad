use std::fmt::Write as _;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{Result, SpectraError};
use crate::frame::SpectralShape;

/// Detector readout region.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoiRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Acquisition metadata carried in the SPE XML footer. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpeMetadata {
    /// Neutral-density filter strength, used to pick matching response files.
    pub optical_density: Option<String>,
    pub frame_rate: Option<f64>,
    pub capture_date: Option<String>,
    pub calibration_date: Option<String>,
    pub roi_list: Vec<RoiRegion>,
    pub wavelengths: Option<Vec<f64>>,
}

impl SpeMetadata {
    fn is_empty(&self) -> bool {
        self.optical_density.is_none()
            && self.frame_rate.is_none()
            && self.capture_date.is_none()
            && self.calibration_date.is_none()
            && self.roi_list.is_empty()
            && self.wavelengths.is_none()
    }
}

#[derive(Clone, Copy)]
enum TextField {
    Wavelength,
    FrameRate,
    OpticalDensity,
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_u32(value: Option<String>) -> Option<u32> {
    value.and_then(|v| v.trim().parse().ok())
}

fn parse_wavelength_list(text: &str) -> Option<Vec<f64>> {
    text.split(',')
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<f64>().ok())
        .collect()
}

fn visit_element(e: &BytesStart, meta: &mut SpeMetadata) -> Result<Option<TextField>> {
    match e.local_name().as_ref() {
        b"DataBlock" => {
            if attribute(e, "type")?.as_deref() == Some("Region") {
                meta.roi_list.push(RoiRegion {
                    x: parse_u32(attribute(e, "x")?).unwrap_or(0),
                    y: parse_u32(attribute(e, "y")?).unwrap_or(0),
                    width: parse_u32(attribute(e, "width")?).unwrap_or(0),
                    height: parse_u32(attribute(e, "height")?).unwrap_or(0),
                });
            }
            Ok(None)
        }
        b"WavelengthMapping" => {
            if let Some(date) = attribute(e, "date")? {
                meta.calibration_date = Some(date);
            }
            Ok(None)
        }
        b"Origin" => {
            if let Some(created) = attribute(e, "created")? {
                meta.capture_date = Some(created);
            }
            Ok(None)
        }
        b"Filter" => {
            if let Some(od) = attribute(e, "opticalDensity")? {
                meta.optical_density = Some(od);
            }
            Ok(None)
        }
        b"Wavelength" => Ok(Some(TextField::Wavelength)),
        b"FrameRate" => Ok(Some(TextField::FrameRate)),
        b"OpticalDensity" => Ok(Some(TextField::OpticalDensity)),
        _ => Ok(None),
    }
}

/// Parse the XML footer of an SPE file.
///
/// Unknown elements are ignored. Fails with `MetadataUnavailable` when none of
/// the recognised fields are present.
pub fn parse_footer(xml: &str) -> Result<SpeMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut meta = SpeMetadata::default();
    let mut current: Option<TextField> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                current = visit_element(e, &mut meta)?;
            }
            Ok(Event::Empty(ref e)) => {
                visit_element(e, &mut meta)?;
            }
            Ok(Event::Text(ref t)) => {
                if let Some(field) = current {
                    let text = t.unescape()?;
                    match field {
                        TextField::Wavelength => meta.wavelengths = parse_wavelength_list(&text),
                        TextField::FrameRate => meta.frame_rate = text.trim().parse().ok(),
                        TextField::OpticalDensity => {
                            meta.optical_density = Some(text.trim().to_string())
                        }
                    }
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SpectraError::MetadataUnavailable(format!(
                    "unparseable XML footer: {e}"
                )))
            }
            _ => {}
        }
    }

    if meta.is_empty() {
        return Err(SpectraError::MetadataUnavailable(
            "XML footer carries no recognised fields".into(),
        ));
    }
    Ok(meta)
}

/// Render a footer document that [`parse_footer`] reads back.
pub fn render_footer(meta: &SpeMetadata, shape: &SpectralShape) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(r#"<SpeFormat version="3.0" xmlns="http://www.princetoninstruments.com/spe/2009">"#);

    let _ = write!(
        xml,
        r#"<DataFormat><DataBlock type="Frame" count="{}">"#,
        shape.frame_num
    );
    let default_roi = [RoiRegion {
        x: 0,
        y: 0,
        width: shape.wavelength_pixel_num as u32,
        height: shape.position_pixel_num as u32,
    }];
    let rois = if meta.roi_list.is_empty() {
        &default_roi[..]
    } else {
        &meta.roi_list[..]
    };
    for roi in rois {
        let _ = write!(
            xml,
            r#"<DataBlock type="Region" x="{}" y="{}" width="{}" height="{}"/>"#,
            roi.x, roi.y, roi.width, roi.height
        );
    }
    xml.push_str("</DataBlock></DataFormat>");

    if let Some(ref wavelengths) = meta.wavelengths {
        xml.push_str("<Calibrations><WavelengthMapping");
        if let Some(ref date) = meta.calibration_date {
            let _ = write!(xml, r#" date="{}""#, escape(date.as_str()));
        }
        let list: Vec<String> = wavelengths.iter().map(|w| format!("{w:?}")).collect();
        let _ = write!(
            xml,
            "><Wavelength>{}</Wavelength></WavelengthMapping></Calibrations>",
            list.join(",")
        );
    }

    xml.push_str("<DataHistories><DataHistory><Origin");
    if let Some(ref created) = meta.capture_date {
        let _ = write!(xml, r#" created="{}""#, escape(created.as_str()));
    }
    xml.push_str("><Experiment>");
    if let Some(rate) = meta.frame_rate {
        let _ = write!(xml, "<FrameRate>{rate:?}</FrameRate>");
    }
    if let Some(ref od) = meta.optical_density {
        let _ = write!(xml, "<OpticalDensity>{}</OpticalDensity>", escape(od.as_str()));
    }
    xml.push_str("</Experiment></Origin></DataHistory></DataHistories></SpeFormat>");
    xml
}
