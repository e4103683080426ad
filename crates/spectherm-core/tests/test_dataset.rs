#[allow(dead_code)]
mod common;

use ndarray::{Array1, Array2, Array3};
use tempfile::tempdir;

use spectherm_core::config::CoreConfig;
use spectherm_core::error::SpectraError;
use spectherm_core::frame::{SampleType, SpectralShape};
use spectherm_core::io::dataset::{CALIBRATED_SPECTRA, MASK_STATUS, VALUE_T, WAVELENGTH_ARR};
use spectherm_core::io::DatasetStore;
use spectherm_core::spectrum::{SpectrumData, SpectrumSource};

const HDF5_SIGNATURE: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

#[test]
fn test_create_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.hdf");

    let store = DatasetStore::create(&path).unwrap();
    store
        .write_array1(WAVELENGTH_ARR, &Array1::from(vec![1.0, 2.0]))
        .unwrap();
    drop(store);

    let reopened = DatasetStore::create(&path).unwrap();
    assert!(reopened.contains(WAVELENGTH_ARR));
    assert_eq!(reopened.read_array1(WAVELENGTH_ARR).unwrap().to_vec(), vec![1.0, 2.0]);

    // Writing a second dataset keeps the first.
    reopened.write_array2(VALUE_T, &Array2::zeros((1, 1))).unwrap();
    assert!(reopened.contains(WAVELENGTH_ARR));
    assert!(reopened.contains(VALUE_T));
}

#[test]
fn test_create_over_foreign_file_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out.hdf");
    std::fs::write(&path, b"not an hdf5 file").unwrap();
    assert!(matches!(
        DatasetStore::create(&path),
        Err(SpectraError::InvalidDataset(_))
    ));
    assert!(matches!(
        DatasetStore::create(dir.path()),
        Err(SpectraError::InvalidDataset(_))
    ));
}

#[test]
fn test_open_missing_is_unsupported() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        DatasetStore::open(&dir.path().join("missing.hdf")),
        Err(SpectraError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_frame_writes_land_in_place() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::create(&dir.path().join("cube.hdf")).unwrap();
    store
        .create_dataset(CALIBRATED_SPECTRA, &[3, 2, 4], SampleType::F64)
        .unwrap();

    let frame = Array2::from_shape_fn((2, 4), |(p, w)| (p * 4 + w) as f64 + 0.5);
    store.write_frame(CALIBRATED_SPECTRA, 1, frame.view()).unwrap();

    let array = store.open_array(CALIBRATED_SPECTRA).unwrap();
    assert_eq!(array.shape(), &[3, 2, 4]);
    assert_eq!(array.dtype(), SampleType::F64);
    assert_eq!(array.read_frame(1).unwrap(), frame);
    // Untouched frames stay zero-filled.
    assert!(array.read_frame(0).unwrap().iter().all(|v| *v == 0.0));
    assert!(array.read_frame(2).unwrap().iter().all(|v| *v == 0.0));
    assert!(matches!(
        array.read_frame(3),
        Err(SpectraError::FrameIndexOutOfRange { index: 3, total: 3 })
    ));
}

#[test]
fn test_frame_write_checks_bounds_and_shape() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::create(&dir.path().join("cube.hdf")).unwrap();
    store
        .create_dataset(CALIBRATED_SPECTRA, &[2, 2, 2], SampleType::F32)
        .unwrap();

    let frame = Array2::<f64>::zeros((2, 2));
    assert!(matches!(
        store.write_frame(CALIBRATED_SPECTRA, 2, frame.view()),
        Err(SpectraError::FrameIndexOutOfRange { index: 2, total: 2 })
    ));

    let wrong = Array2::<f64>::zeros((3, 2));
    assert!(matches!(
        store.write_frame(CALIBRATED_SPECTRA, 0, wrong.view()),
        Err(SpectraError::ShapeMismatch(_))
    ));
}

#[test]
fn test_files_are_hdf5() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("result.hdf");
    let values = Array2::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as f64);
    {
        let store = DatasetStore::create(&path).unwrap();
        store.write_array2(VALUE_T, &values).unwrap();
    }

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..8], HDF5_SIGNATURE);

    // Readable by any HDF5 client under the same group path.
    let file = hdf5::File::open(&path).unwrap();
    let read: Array2<f64> = file.dataset(VALUE_T).unwrap().read_2d().unwrap();
    assert_eq!(read, values);
}

#[test]
fn test_integer_dataset_saturates() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::create(&dir.path().join("mask.hdf")).unwrap();
    let mask = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 2.9, 300.0]).unwrap();
    store.write_array(MASK_STATUS, mask.view(), SampleType::U8).unwrap();

    let array = store.open_array(MASK_STATUS).unwrap();
    assert_eq!(array.dtype(), SampleType::U8);
    assert_eq!(array.shape(), &[2, 2]);
    let expected = Array2::from_shape_vec((2, 2), vec![0.0, 1.0, 2.0, 255.0]).unwrap();
    assert_eq!(store.read_array2(MASK_STATUS).unwrap(), expected);
}

#[test]
fn test_rejects_bad_dataset_names() {
    let dir = tempdir().unwrap();
    let store = DatasetStore::create(&dir.path().join("x.hdf")).unwrap();
    let data = Array1::from(vec![1.0]);
    for name in ["../outside", "entry//T", "", "entry/"] {
        assert!(
            matches!(store.write_array1(name, &data), Err(SpectraError::InvalidInput(_))),
            "{name:?}"
        );
    }
    assert!(matches!(
        store.read_array1("entry/missing"),
        Err(SpectraError::InvalidDataset(_))
    ));
    assert!(matches!(
        store.read_array1("nowhere/missing"),
        Err(SpectraError::InvalidDataset(_))
    ));
    assert!(!store.contains("nowhere/missing"));
}

#[test]
fn test_reads_calibrated_file_from_another_writer() {
    // Integer cube and wavelengths written directly through HDF5, as older
    // calibration tooling produced them.
    let dir = tempdir().unwrap();
    let path = dir.path().join("run_calib.hdf");
    let cube = Array3::from_shape_fn((2, 3, 4), |(f, p, w)| (f * 100 + p * 10 + w) as u16);
    let wl = Array1::from(vec![600.0, 610.0, 620.0, 630.0]);
    {
        let file = hdf5::File::create(&path).unwrap();
        let entry = file.create_group("entry").unwrap();
        entry
            .new_dataset::<u16>()
            .shape((2, 3, 4))
            .create("calibrated_spectra")
            .unwrap()
            .write(&cube)
            .unwrap();
        entry
            .new_dataset::<f64>()
            .shape((4,))
            .create("wavelength_arr")
            .unwrap()
            .write(&wl)
            .unwrap();
    }

    let data = SpectrumData::open(&path, &CoreConfig::default()).unwrap();
    assert!(matches!(data.source(), SpectrumSource::Tabular(_)));
    assert_eq!(data.shape(), SpectralShape::new(2, 3, 4));
    assert_eq!(data.sample_type(), SampleType::U16);
    assert_eq!(data.wavelengths().unwrap().to_vec(), wl.to_vec());
    assert_eq!(data.frame(1).unwrap()[[2, 3]], 123.0);
}
