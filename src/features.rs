use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use sysinfo::{Disks, System};
use tracing::info;

pub type FeatureMap = BTreeMap<String, Value>;

const MB: u64 = 1024 * 1024;

/// Describe this machine for the server, which uses the features to pick
/// a suitable job. `overrides` replace detected values.
pub fn get_features(overrides: &FeatureMap) -> FeatureMap {
    let detected = detect_features();
    merge_features(detected, overrides)
}

fn detect_features() -> FeatureMap {
    let mut f = FeatureMap::new();

    let arch = std::env::consts::ARCH;
    f.insert("linux".into(), cfg!(target_os = "linux").into());
    f.insert("mac".into(), cfg!(target_os = "macos").into());
    f.insert("x86_64".into(), (arch == "x86_64").into());
    f.insert("armv7l".into(), (arch == "arm").into());

    let mut sys = System::new_all();
    f.insert("ram_total_mb".into(), (sys.total_memory() / MB).into());
    f.insert("ram_available_mb".into(), (sys.available_memory() / MB).into());
    f.insert("nprocessors".into(), (sys.cpus().len() as u64).into());

    let max_freq = sys.cpus().iter().map(|c| c.frequency()).max().unwrap_or(0);
    // frequency is unknown inside some containers
    if max_freq > 0 {
        f.insert("processor_frequency_mhz".into(), max_freq.into());
    }

    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(std::time::Duration::from_millis(200)));
    sys.refresh_cpu_usage();
    let busy = sys.global_cpu_usage().clamp(0.0, 100.0);
    f.insert("processor_free_percent".into(), ((100.0 - busy) as u64).into());
    f.insert("p1".into(), true.into());

    let cwd = std::env::current_dir().unwrap_or_else(|_| "/".into());
    let (total, available) = disk_space_for(&cwd);
    f.insert("disk_total_mb".into(), (total / MB).into());
    f.insert("disk_available_mb".into(), (available / MB).into());

    f.insert("picamera".into(), false.into());
    f.insert("nduckiebots".into(), false.into());
    f.insert("map_3x3".into(), false.into());
    f.insert(
        "gpu".into(),
        Path::new("/proc/driver/nvidia/version").exists().into(),
    );
    f
}

/// Total and available bytes of the disk holding `path`.
fn disk_space_for(path: &Path) -> (u64, u64) {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| (d.total_space(), d.available_space()))
        .unwrap_or((0, 0))
}

pub fn merge_features(mut base: FeatureMap, overrides: &FeatureMap) -> FeatureMap {
    for (k, v) in overrides {
        if let Some(old) = base.get(k) {
            info!("Using {:?} = {:?} instead of {:?}", k, v, old);
        }
        base.insert(k.clone(), v.clone());
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_overrides_and_adds() {
        let mut base = FeatureMap::new();
        base.insert("gpu".into(), false.into());
        base.insert("nprocessors".into(), 4u64.into());

        let mut overrides = FeatureMap::new();
        overrides.insert("gpu".into(), true.into());
        overrides.insert("map_5x5".into(), true.into());

        let merged = merge_features(base, &overrides);
        assert_eq!(merged["gpu"], Value::Bool(true));
        assert_eq!(merged["map_5x5"], Value::Bool(true));
        assert_eq!(merged["nprocessors"].as_u64(), Some(4));
    }

    #[test]
    fn test_detected_features_have_fixed_keys() {
        let f = get_features(&FeatureMap::new());
        for key in ["linux", "mac", "x86_64", "nprocessors", "p1", "gpu", "disk_total_mb"] {
            assert!(f.contains_key(key), "missing {}", key);
        }
        assert_eq!(f["p1"], Value::Bool(true));
        assert_eq!(f["picamera"], Value::Bool(false));
    }
}
