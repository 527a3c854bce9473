use std::io::Write;

use sensor_forge_render::sensors::UnmappedObjectPolicy;
use sensor_forge_render::{PipelineConfig, load_config_from_path};

#[test]
fn loads_config_file_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "resolution": [64, 32],
            "shader_dump_dir": "/tmp/shaders",
            "instance_camera": {{ "width": 84, "unmapped_objects": "reject" }}
        }}"#
    )
    .unwrap();

    let config = load_config_from_path(file.path()).unwrap();
    assert_eq!(config.resolution, [64, 32]);
    assert_eq!(config.shader_dump_dir.as_deref(), Some(std::path::Path::new("/tmp/shaders")));
    assert_eq!(config.instance_camera.width, 84);
    assert_eq!(config.instance_camera.height, 128);
    assert_eq!(config.instance_camera.unmapped_objects, UnmappedObjectPolicy::Reject);
}

#[test]
fn serialized_config_reloads_identically() {
    let mut config = PipelineConfig::default();
    config.resolution = [320, 200];
    config.instance_camera.fov_deg = 45.0;
    let text = serde_json::to_string_pretty(&config).unwrap();
    assert_eq!(PipelineConfig::from_json_str(&text).unwrap(), config);
}

#[test]
fn missing_or_malformed_files_are_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_config_from_path(&dir.path().join("absent.json")).is_err());

    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ resolution: ").unwrap();
    let err = load_config_from_path(&path).unwrap_err();
    assert!(format!("{err:#}").contains("bad.json"));
}
