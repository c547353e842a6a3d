use glam::Vec3;
use smallvec::SmallVec;

use super::RenderTargetKey;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotCone {
    pub inner: f32,
    pub outer: f32,
}

/// Light type. Omni and spot lights are local and go through light clusters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional,
    Omni { range: f32 },
    Spot { range: f32, cone: SpotCone },
}

impl LightKind {
    #[inline]
    #[must_use]
    pub fn is_clustered(&self) -> bool {
        !matches!(self, Self::Directional)
    }

    /// Influence radius of local lights.
    #[inline]
    #[must_use]
    pub fn range(&self) -> Option<f32> {
        match self {
            Self::Directional => None,
            Self::Omni { range } | Self::Spot { range, .. } => Some(*range),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Light {
    name: String,
    kind: LightKind,
    enabled: bool,
    cast_shadows: bool,
    position: Vec3,
    // One target per shadow view: 1 for directional/spot, 6 cube faces for omni.
    shadow_targets: SmallVec<[RenderTargetKey; 6]>,
    dirty: bool,
}

impl Light {
    fn with_kind(name: impl Into<String>, kind: LightKind) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            cast_shadows: false,
            position: Vec3::ZERO,
            shadow_targets: SmallVec::new(),
            dirty: true,
        }
    }

    #[must_use]
    pub fn directional(name: impl Into<String>) -> Self {
        Self::with_kind(name, LightKind::Directional)
    }

    #[must_use]
    pub fn omni(name: impl Into<String>, range: f32) -> Self {
        Self::with_kind(name, LightKind::Omni { range })
    }

    #[must_use]
    pub fn spot(name: impl Into<String>, range: f32, inner_cone: f32, outer_cone: f32) -> Self {
        Self::with_kind(
            name,
            LightKind::Spot {
                range,
                cone: SpotCone {
                    inner: inner_cone,
                    outer: outer_cone,
                },
            },
        )
    }

    /// Enables shadow casting into the given shadow map targets.
    #[must_use]
    pub fn with_shadows(mut self, targets: &[RenderTargetKey]) -> Self {
        self.cast_shadows = true;
        self.shadow_targets = targets.iter().copied().collect();
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> LightKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.dirty = true;
        }
    }

    #[inline]
    #[must_use]
    pub fn cast_shadows(&self) -> bool {
        self.cast_shadows
    }

    pub fn set_cast_shadows(&mut self, cast_shadows: bool) {
        if self.cast_shadows != cast_shadows {
            self.cast_shadows = cast_shadows;
            self.dirty = true;
        }
    }

    /// Enabled, shadow-casting and with at least one shadow map.
    #[inline]
    #[must_use]
    pub fn renders_shadows(&self) -> bool {
        self.enabled && self.cast_shadows && !self.shadow_targets.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Moving a light only changes cluster contents, not the pass structure,
    /// so it does not mark the light dirty.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    #[inline]
    #[must_use]
    pub fn shadow_targets(&self) -> &[RenderTargetKey] {
        &self.shadow_targets
    }

    pub fn set_shadow_targets(&mut self, targets: &[RenderTargetKey]) {
        self.shadow_targets = targets.iter().copied().collect();
        self.dirty = true;
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
