//! Conversion tests: OME-TIFF bytes in, one image layer out.

use std::sync::Arc;

use ometiff_reader::{
    AxesOrder, ConversionReport, ConversionWarning, DisplayMetadata, IoError, LayerData,
    LayerType, MemoryReader, RangeReader, ReaderError, ReaderPlugin, TiffError,
};

use super::test_utils::{
    multichannel_pyramid, rgb_pyramid, sample_value, ByteOrderType, Codec, Layout, OmeTiffSpec,
};

async fn convert(spec: &OmeTiffSpec) -> Result<(Vec<LayerData>, ConversionReport), ReaderError> {
    let reader = ReaderPlugin::new()
        .get_reader("synthetic.ome.tif")
        .expect("suffix is handled");
    let source: Arc<dyn RangeReader> = Arc::new(MemoryReader::new(spec.build(), "synthetic.ome.tif"));
    reader.read_from(source).await
}

fn level_shapes(layer: &LayerData) -> Vec<Vec<usize>> {
    layer.data.iter().map(|level| level.shape()).collect()
}

// =============================================================================
// RGB Pyramids
// =============================================================================

#[tokio::test]
async fn test_rgb_pyramid_layer_structure() {
    let (layers, report) = convert(&rgb_pyramid()).await.unwrap();

    assert_eq!(layers.len(), 1);
    let layer = &layers[0];
    assert_eq!(layer.layer_type, LayerType::Image);
    assert_eq!(layer.layer_type.to_string(), "image");
    assert_eq!(layer.metadata, DisplayMetadata::IMAGE);
    assert_eq!(
        layer.metadata,
        DisplayMetadata {
            rgb: true,
            contrast_limits: (0, 255),
            multiscale: true
        }
    );

    assert_eq!(report.axes, "cyx");
    assert_eq!(report.axes_order, AxesOrder { c: 0, y: 1, x: 2 });
    assert_eq!(report.image_name.as_deref(), Some("synthetic"));

    assert_eq!(
        level_shapes(layer),
        vec![vec![24, 40, 3], vec![12, 20, 3], vec![6, 10, 3]]
    );
    for (index, level) in layer.data.iter().enumerate() {
        assert_eq!(level.level(), index);
        assert_eq!(level.axes(), "yxc");
    }
}

#[tokio::test]
async fn test_rgb_512_square() {
    let spec = OmeTiffSpec {
        width: 512,
        height: 512,
        levels: 2,
        layout: Layout::Tiles(256, 256),
        ..rgb_pyramid()
    };
    let (layers, report) = convert(&spec).await.unwrap();

    assert_eq!(report.axes, "cyx");
    assert_eq!(report.axes_order, AxesOrder { c: 0, y: 1, x: 2 });
    assert_eq!(
        level_shapes(&layers[0]),
        vec![vec![512, 512, 3], vec![256, 256, 3]]
    );
}

#[tokio::test]
async fn test_rgb_level_values() {
    let spec = rgb_pyramid();
    let (layers, _) = convert(&spec).await.unwrap();

    for (level, array) in layers[0].data.iter().enumerate() {
        let data = array.read::<u8>().await.unwrap();
        let (width, height) = spec.level_size(level);
        assert_eq!(data.shape(), &[height as usize, width as usize, 3]);

        for y in 0..height as usize {
            for x in 0..width as usize {
                for c in 0..3 {
                    assert_eq!(
                        data[[y, x, c]],
                        sample_value(level, 0, c, 0, y, x) as u8,
                        "level {} y {} x {} c {}",
                        level,
                        y,
                        x,
                        c
                    );
                }
            }
        }
    }
}

#[tokio::test]
async fn test_read_region_across_tiles() {
    let (layers, _) = convert(&rgb_pyramid()).await.unwrap();
    let level0 = &layers[0].data[0];

    let region = level0.read_region::<u8>(&[5..20, 10..35, 1..3]).await.unwrap();
    assert_eq!(region.shape(), &[15, 25, 2]);
    for y in 0..15 {
        for x in 0..25 {
            for c in 0..2 {
                assert_eq!(
                    region[[y, x, c]],
                    sample_value(0, 0, c + 1, 0, y + 5, x + 10) as u8
                );
            }
        }
    }

    let empty = level0.read_region::<u8>(&[3..3, 0..40, 0..3]).await.unwrap();
    assert_eq!(empty.shape(), &[0, 40, 3]);
}

#[tokio::test]
async fn test_read_region_rejects_bad_requests() {
    let (layers, _) = convert(&rgb_pyramid()).await.unwrap();
    let level0 = &layers[0].data[0];

    assert!(matches!(
        level0.read_region::<u8>(&[0..24, 0..40]).await,
        Err(ReaderError::InvalidRequest(_))
    ));
    assert!(matches!(
        level0.read_region::<u8>(&[0..25, 0..40, 0..3]).await,
        Err(ReaderError::InvalidRequest(_))
    ));
    assert!(matches!(
        level0.read::<u16>().await,
        Err(ReaderError::PixelTypeMismatch {
            actual: "uint8",
            requested: "uint16"
        })
    ));
}

#[tokio::test]
async fn test_rgb_jpeg_tiles() {
    let spec = OmeTiffSpec {
        width: 32,
        height: 32,
        levels: 2,
        codec: Codec::Jpeg,
        ..rgb_pyramid()
    };
    let (layers, _) = convert(&spec).await.unwrap();
    let data = layers[0].data[0].read::<u8>().await.unwrap();
    assert_eq!(data.shape(), &[32, 32, 3]);

    for y in 0..32 {
        for x in 0..32 {
            for c in 0..3 {
                let expected = sample_value(0, 0, c, 0, y, x) as i32;
                let actual = data[[y, x, c]] as i32;
                assert!(
                    (actual - expected).abs() <= 12,
                    "y {} x {} c {}: {} vs {}",
                    y,
                    x,
                    c,
                    actual,
                    expected
                );
            }
        }
    }
}

#[tokio::test]
async fn test_rgb_bigtiff_big_endian_strips() {
    let spec = OmeTiffSpec {
        byte_order: ByteOrderType::BigEndian,
        bigtiff: true,
        layout: Layout::Strips(7),
        codec: Codec::Deflate,
        ..rgb_pyramid()
    };
    let (layers, _) = convert(&spec).await.unwrap();
    let data = layers[0].data[1].read::<u8>().await.unwrap();
    assert_eq!(data.shape(), &[12, 20, 3]);
    assert_eq!(data[[11, 19, 2]], sample_value(1, 0, 2, 0, 11, 19) as u8);
    assert_eq!(data[[0, 0, 0]], sample_value(1, 0, 0, 0, 0, 0) as u8);
}

// =============================================================================
// Multi-channel Pyramids
// =============================================================================

#[tokio::test]
async fn test_multichannel_axes_moved_to_front() {
    let spec = multichannel_pyramid();
    let (layers, report) = convert(&spec).await.unwrap();

    // TCZYX with T=1 -> "czyx"; (y, x, c) lead and z follows
    assert_eq!(report.axes, "czyx");
    assert_eq!(report.axes_order, AxesOrder { c: 0, y: 2, x: 3 });
    let level0 = &layers[0].data[0];
    assert_eq!(level0.axes(), "yxcz");
    assert_eq!(level0.shape(), vec![24, 40, 2, 3]);

    let data = level0.read::<u16>().await.unwrap();
    for z in 0..3 {
        for c in 0..2 {
            for (y, x) in [(0, 0), (4, 5), (5, 39), (23, 17)] {
                assert_eq!(data[[y, x, c, z]], sample_value(0, z, c, 0, y, x) as u16);
            }
        }
    }
}

#[tokio::test]
async fn test_dimension_order_does_not_change_leading_axes() {
    let spec = OmeTiffSpec {
        dimension_order: "XYCZT",
        ..multichannel_pyramid()
    };
    let (layers, report) = convert(&spec).await.unwrap();

    assert_eq!(report.axes, "zcyx");
    assert_eq!(report.axes_order, AxesOrder { c: 1, y: 2, x: 3 });
    let level2 = &layers[0].data[2];
    assert_eq!(level2.axes(), "yxcz");
    assert_eq!(level2.shape(), vec![6, 10, 2, 3]);

    let data = level2.read::<u16>().await.unwrap();
    assert_eq!(data[[5, 9, 1, 2]], sample_value(2, 2, 1, 0, 5, 9) as u16);
}

#[tokio::test]
async fn test_multichannel_big_endian_deflate() {
    let spec = OmeTiffSpec {
        byte_order: ByteOrderType::BigEndian,
        codec: Codec::Deflate,
        layout: Layout::Tiles(16, 16),
        ..multichannel_pyramid()
    };
    let (layers, _) = convert(&spec).await.unwrap();
    let data = layers[0].data[0].read::<u16>().await.unwrap();
    assert_eq!(data[[23, 39, 1, 2]], sample_value(0, 2, 1, 0, 23, 39) as u16);
}

#[tokio::test]
async fn test_multichannel_lzw_strips() {
    let spec = OmeTiffSpec {
        codec: Codec::Lzw,
        layout: Layout::Strips(5),
        ..multichannel_pyramid()
    };
    let (layers, _) = convert(&spec).await.unwrap();
    let data = layers[0].data[0].read::<u16>().await.unwrap();
    assert_eq!(data[[0, 0, 0, 0]], sample_value(0, 0, 0, 0, 0, 0) as u16);
    assert_eq!(data[[23, 39, 1, 2]], sample_value(0, 2, 1, 0, 23, 39) as u16);

    let data = layers[0].data[1].read::<u16>().await.unwrap();
    assert_eq!(data[[11, 19, 0, 1]], sample_value(1, 1, 0, 0, 11, 19) as u16);
}

#[tokio::test]
async fn test_tiff_data_maps_planes_to_ifds() {
    let spec = OmeTiffSpec {
        tiff_data: true,
        reverse_ifds: true,
        pixel_type: "uint8",
        ..multichannel_pyramid()
    };
    let (layers, _) = convert(&spec).await.unwrap();
    let data = layers[0].data[1].read::<u8>().await.unwrap();
    assert_eq!(data.shape(), &[12, 20, 2, 3]);
    for z in 0..3 {
        for c in 0..2 {
            assert_eq!(data[[3, 4, c, z]], sample_value(1, z, c, 0, 3, 4) as u8);
        }
    }
}

#[tokio::test]
async fn test_time_series_keeps_all_axes() {
    let spec = OmeTiffSpec {
        size_t: 2,
        size_z: 1,
        levels: 2,
        ..multichannel_pyramid()
    };
    let (layers, report) = convert(&spec).await.unwrap();
    assert_eq!(report.axes, "tcyx");
    let level0 = &layers[0].data[0];
    assert_eq!(level0.axes(), "yxct");
    let data = level0.read::<u16>().await.unwrap();
    assert_eq!(data[[2, 3, 1, 1]], sample_value(0, 0, 1, 1, 2, 3) as u16);
}

#[tokio::test]
async fn test_read_any_reports_range() {
    let (layers, _) = convert(&multichannel_pyramid()).await.unwrap();
    let smallest = layers[0].data.last().unwrap();
    let data = smallest.read_any().await.unwrap();
    assert_eq!(data.shape(), &[6, 10, 2, 3]);

    let min = sample_value(2, 0, 0, 0, 0, 0) as f64;
    let max = sample_value(2, 2, 1, 0, 5, 9) as f64;
    assert_eq!(data.min_max(), Some((min, max)));
}

// =============================================================================
// Physical Size
// =============================================================================

#[tokio::test]
async fn test_micrometer_resolution() {
    let (_, report) = convert(&rgb_pyramid()).await.unwrap();
    assert_eq!(report.base_mpp_x, Some(0.25));
    assert_eq!(report.base_mpp_y, Some(0.25));
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_millimeter_resolution() {
    let spec = OmeTiffSpec {
        physical_size: Some((0.001, "mm")),
        ..rgb_pyramid()
    };
    let (_, report) = convert(&spec).await.unwrap();
    assert!((report.base_mpp_x.unwrap() - 1.0).abs() < 1e-9);
    assert!((report.base_mpp_y.unwrap() - 1.0).abs() < 1e-9);
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_unknown_unit_warns_and_succeeds() {
    let spec = OmeTiffSpec {
        physical_size: Some((250.0, "nm")),
        ..rgb_pyramid()
    };
    let (layers, report) = convert(&spec).await.unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(report.base_mpp_x, Some(250.0));
    assert_eq!(
        report.warnings,
        vec![
            ConversionWarning::UnknownResolutionUnit {
                axis: 'X',
                unit: "nm".to_string()
            },
            ConversionWarning::UnknownResolutionUnit {
                axis: 'Y',
                unit: "nm".to_string()
            },
        ]
    );
    assert_eq!(report.warnings[0].to_string(), "unknown unit for resolution (X)");
}

#[tokio::test]
async fn test_missing_physical_size() {
    let spec = OmeTiffSpec {
        physical_size: None,
        ..rgb_pyramid()
    };
    let (_, report) = convert(&spec).await.unwrap();
    assert_eq!(report.base_mpp_x, None);
    assert_eq!(report.base_mpp_y, None);
    assert!(report.warnings.is_empty());
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_plain_tiff_rejected() {
    let spec = OmeTiffSpec {
        description: Some("Aperio Image Library v12.0.15".to_string()),
        ..rgb_pyramid()
    };
    let err = convert(&spec).await.unwrap_err();
    assert!(matches!(err, ReaderError::NotOmeFormat));
    assert_eq!(err.to_string(), "only OME TIFF files are accepted.");
}

#[tokio::test]
async fn test_single_level_rejected() {
    let spec = OmeTiffSpec {
        levels: 1,
        ..rgb_pyramid()
    };
    let err = convert(&spec).await.unwrap_err();
    assert!(matches!(err, ReaderError::NotPyramidal { levels: 1 }));
    assert_eq!(err.to_string(), "only pyramidal images are accepted.");
}

#[tokio::test]
async fn test_grayscale_has_no_channel_axis() {
    let spec = OmeTiffSpec {
        size_c: 1,
        samples_per_pixel: 1,
        ..rgb_pyramid()
    };
    match convert(&spec).await {
        Err(ReaderError::MetadataAxisMissing { axis, axes }) => {
            assert_eq!(axis, 'c');
            assert_eq!(axes, "yx");
        }
        other => panic!("unexpected {:?}", other.map(|(_, report)| report)),
    }
}

#[tokio::test]
async fn test_metadata_pixel_type_must_match_file() {
    let mut spec = rgb_pyramid();
    let claimed = OmeTiffSpec {
        pixel_type: "uint16",
        ..rgb_pyramid()
    };
    spec.description = Some(claimed.ome_xml());
    assert!(matches!(
        convert(&spec).await,
        Err(ReaderError::InconsistentPyramid(_))
    ));
}

#[tokio::test]
async fn test_metadata_size_must_match_file() {
    let mut spec = rgb_pyramid();
    let claimed = OmeTiffSpec {
        width: 41,
        ..rgb_pyramid()
    };
    spec.description = Some(claimed.ome_xml());
    assert!(matches!(
        convert(&spec).await,
        Err(ReaderError::InconsistentPyramid(_))
    ));
}

#[tokio::test]
async fn test_missing_plane_reported() {
    let mut spec = multichannel_pyramid();
    let claimed = OmeTiffSpec {
        size_z: 4,
        ..multichannel_pyramid()
    };
    spec.description = Some(claimed.ome_xml());
    // Sequential mapping: planes 6 and 7 have no IFD
    assert!(matches!(
        convert(&spec).await,
        Err(ReaderError::MissingPlane { z: 2, c: 1, t: 0 })
    ));
}

#[tokio::test]
async fn test_plane_count_beyond_ifds_rejected() {
    let mut spec = rgb_pyramid();
    let claimed = OmeTiffSpec {
        size_z: 1 << 20,
        size_t: 1 << 20,
        ..rgb_pyramid()
    };
    spec.description = Some(claimed.ome_xml());
    assert!(matches!(
        convert(&spec).await,
        Err(ReaderError::MissingPlane { .. })
    ));
}

#[cfg(target_pointer_width = "64")]
#[tokio::test]
async fn test_plane_count_overflow_rejected() {
    let mut spec = rgb_pyramid();
    let claimed = OmeTiffSpec {
        size_z: 1 << 40,
        size_t: 1 << 40,
        ..rgb_pyramid()
    };
    spec.description = Some(claimed.ome_xml());
    assert!(matches!(
        convert(&spec).await,
        Err(ReaderError::InconsistentPyramid(_))
    ));
}

#[tokio::test]
async fn test_not_a_tiff() {
    let source: Arc<dyn RangeReader> =
        Arc::new(MemoryReader::new(b"<html>not a tiff</html>".to_vec(), "fake.ome.tif"));
    let reader = ReaderPlugin::new().get_reader("fake.ome.tif").unwrap();
    assert!(matches!(
        reader.read_from(source).await,
        Err(ReaderError::Tiff(TiffError::InvalidMagic(_)))
    ));
}

// =============================================================================
// Files on Disk
// =============================================================================

#[tokio::test]
async fn test_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.ome.tiff");
    std::fs::write(&path, rgb_pyramid().build()).unwrap();

    let plugin = ReaderPlugin::new();
    let reader = plugin.get_reader(path.clone()).unwrap();
    let layers = reader.read(vec![path.clone(), dir.path().join("ignored.png")]).await.unwrap();
    assert_eq!(layers.len(), 1);
    assert_eq!(layers[0].data.len(), 3);

    let thumbnail = layers[0].data[2].read::<u8>().await.unwrap();
    assert_eq!(thumbnail[[5, 9, 1]], sample_value(2, 0, 1, 0, 5, 9) as u8);
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.ome.tif");
    let reader = ReaderPlugin::new().get_reader(path.clone()).unwrap();
    assert!(matches!(
        reader.read(path).await,
        Err(ReaderError::Io(IoError::NotFound(_)))
    ));
}

#[tokio::test]
async fn test_directory_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("folder.ome.tif");
    std::fs::create_dir(&path).unwrap();
    let reader = ReaderPlugin::new().get_reader(path.clone()).unwrap();
    assert!(matches!(reader.read(path).await, Err(ReaderError::Io(_))));
}
