//! Detection tests: only the file name decides, nothing is opened.

use std::path::PathBuf;

use ometiff_reader::{detect_ome_tiff, is_ome_tiff_path, PathInput, ReaderPlugin, OME_TIFF_SUFFIXES};

#[test]
fn test_every_suffix_is_handled() {
    let plugin = ReaderPlugin::new();
    for suffix in OME_TIFF_SUFFIXES {
        let path = format!("/data/sample{}", suffix);
        assert!(plugin.get_reader(path.as_str()).is_some(), "{}", path);
    }
}

#[test]
fn test_suffix_match_is_case_sensitive() {
    let plugin = ReaderPlugin::new();
    assert!(plugin.get_reader("FILE.OME.TIF").is_none());
    assert!(plugin.get_reader("file.ome.TIF").is_none());
    assert!(plugin.get_reader("file.OME.tif").is_none());
}

#[test]
fn test_plain_tiff_not_handled() {
    let plugin = ReaderPlugin::new();
    for name in ["slide.tif", "slide.tiff", "slide.svs", "slide.ome", "slide.ome.zarr"] {
        assert!(plugin.get_reader(name).is_none(), "{}", name);
    }
}

#[test]
fn test_first_path_of_list_decides() {
    let plugin = ReaderPlugin::new();
    assert!(plugin
        .get_reader(vec!["a.ome.tiff", "b.png", "c.jpg"])
        .is_some());
    assert!(plugin.get_reader(vec!["b.png", "a.ome.tiff"]).is_none());
    assert!(plugin.get_reader(Vec::<PathBuf>::new()).is_none());
}

#[test]
fn test_detection_does_not_touch_the_filesystem() {
    // The file does not exist; detection still accepts the name
    let input = PathInput::from("/nonexistent/dir/image.ome_tiff");
    assert_eq!(
        detect_ome_tiff(&input).map(|p| p.to_path_buf()),
        Some(PathBuf::from("/nonexistent/dir/image.ome_tiff"))
    );
}

#[test]
fn test_is_ome_tiff_path_on_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.ome.tif");
    std::fs::write(&path, b"").unwrap();
    assert!(is_ome_tiff_path(&path));
}
