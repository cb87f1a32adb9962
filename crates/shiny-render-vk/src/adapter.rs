// SPDX-License-Identifier: CEPL-1.0
//! Adapter (physical device) selection.
//!
//! The decision runs on plain data ([`AdapterInfo`]) so it can be tested
//! without a driver; `device.rs` gathers that data from the instance.

use crate::error::SetupError;
use crate::gpu::SurfaceSupport;
use ash::vk;
use tracing::{info, warn};

/// Queue families picked for a device session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    pub fn is_split(&self) -> bool {
        self.graphics != self.present
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FamilyInfo {
    pub flags: vk::QueueFlags,
    pub can_present: bool,
}

/// Everything the negotiator needs to know about one adapter.
#[derive(Clone, Debug, Default)]
pub struct AdapterInfo {
    pub name: String,
    pub families: Vec<FamilyInfo>,
    pub extensions: Vec<String>,
    pub surface: SurfaceSupport,
    pub sampler_anisotropy: bool,
}

#[derive(Clone, Debug)]
pub struct Requirements {
    pub extensions: Vec<String>,
    pub sampler_anisotropy: bool,
}

impl Default for Requirements {
    fn default() -> Self {
        Self {
            extensions: vec![ash::khr::swapchain::NAME.to_string_lossy().into_owned()],
            sampler_anisotropy: true,
        }
    }
}

/// Graphics + present families. A family that does both wins; otherwise
/// the first of each.
pub fn pick_queue_families(families: &[FamilyInfo]) -> Option<QueueFamilies> {
    let is_graphics = |f: &FamilyInfo| f.flags.contains(vk::QueueFlags::GRAPHICS);

    if let Some(i) = families.iter().position(|f| is_graphics(f) && f.can_present) {
        return Some(QueueFamilies {
            graphics: i as u32,
            present: i as u32,
        });
    }
    let graphics = families.iter().position(is_graphics)?;
    let present = families.iter().position(|f| f.can_present)?;
    Some(QueueFamilies {
        graphics: graphics as u32,
        present: present as u32,
    })
}

/// Checks one adapter. `Err` carries the human-readable rejection reason.
pub fn evaluate(info: &AdapterInfo, req: &Requirements) -> Result<QueueFamilies, String> {
    if !info.families.iter().any(|f| f.flags.contains(vk::QueueFlags::GRAPHICS)) {
        return Err("no graphics queue family".into());
    }
    if !info.families.iter().any(|f| f.can_present) {
        return Err("no queue family can present to the surface".into());
    }
    if let Some(missing) = req.extensions.iter().find(|e| !info.extensions.contains(e)) {
        return Err(format!("missing device extension {missing}"));
    }
    if info.surface.formats.is_empty() {
        return Err("surface reports no formats".into());
    }
    if info.surface.present_modes.is_empty() {
        return Err("surface reports no present modes".into());
    }
    if req.sampler_anisotropy && !info.sampler_anisotropy {
        return Err("samplerAnisotropy not supported".into());
    }
    pick_queue_families(&info.families).ok_or_else(|| "no usable queue families".into())
}

/// First adapter satisfying every requirement, in enumeration order.
pub fn select(adapters: &[AdapterInfo], req: &Requirements) -> Result<(usize, QueueFamilies), SetupError> {
    let mut rejected = Vec::new();
    for (i, a) in adapters.iter().enumerate() {
        match evaluate(a, req) {
            Ok(families) => {
                info!(
                    "adapter: {} (graphics family {}, present family {})",
                    a.name, families.graphics, families.present
                );
                return Ok((i, families));
            }
            Err(reason) => {
                warn!("adapter {} rejected: {reason}", a.name);
                rejected.push(format!("{}: {reason}", a.name));
            }
        }
    }
    Err(SetupError::NoSuitableAdapter { rejected })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, can_present: bool) -> FamilyInfo {
        FamilyInfo { flags, can_present }
    }

    fn good(name: &str) -> AdapterInfo {
        AdapterInfo {
            name: name.into(),
            families: vec![family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true)],
            extensions: Requirements::default().extensions,
            surface: SurfaceSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR::default()],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
            sampler_anisotropy: true,
        }
    }

    #[test]
    fn combined_family_is_preferred() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::COMPUTE, true),
            family(vk::QueueFlags::GRAPHICS, true),
        ];
        let q = pick_queue_families(&fams).unwrap();
        assert_eq!(q, QueueFamilies { graphics: 2, present: 2 });
        assert!(!q.is_split());
        assert_eq!(q.unique(), vec![2]);
    }

    #[test]
    fn split_families_are_allowed() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS, false),
            family(vk::QueueFlags::COMPUTE, true),
        ];
        let q = pick_queue_families(&fams).unwrap();
        assert_eq!(q, QueueFamilies { graphics: 0, present: 1 });
        assert!(q.is_split());
        assert_eq!(q.unique(), vec![0, 1]);
    }

    #[test]
    fn rejections_carry_reasons() {
        let req = Requirements::default();

        let mut no_ext = good("a");
        no_ext.extensions.clear();
        assert!(evaluate(&no_ext, &req).unwrap_err().contains("VK_KHR_swapchain"));

        let mut no_modes = good("b");
        no_modes.surface.present_modes.clear();
        assert!(evaluate(&no_modes, &req).unwrap_err().contains("present modes"));

        let mut no_aniso = good("c");
        no_aniso.sampler_anisotropy = false;
        assert!(evaluate(&no_aniso, &req).unwrap_err().contains("Anisotropy"));

        let mut no_present = good("d");
        no_present.families[0].can_present = false;
        assert!(evaluate(&no_present, &req).is_err());
    }

    #[test]
    fn select_skips_unsuitable_adapters() {
        let mut bad = good("integrated");
        bad.surface.formats.clear();
        let adapters = [bad, good("discrete")];
        let (i, _) = select(&adapters, &Requirements::default()).unwrap();
        assert_eq!(i, 1);
    }

    #[test]
    fn no_suitable_adapter_is_fatal() {
        let mut bad = good("only");
        bad.sampler_anisotropy = false;
        let err = select(&[bad], &Requirements::default()).unwrap_err();
        match err {
            SetupError::NoSuitableAdapter { rejected } => {
                assert_eq!(rejected.len(), 1);
                assert!(rejected[0].starts_with("only:"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            select(&[], &Requirements::default()),
            Err(SetupError::NoSuitableAdapter { .. })
        ));
    }
}
