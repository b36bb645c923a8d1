use crate::{
    BoundingBoxAttachment, Error, MeshAttachment, RegionAttachment, SkinnedMeshAttachment,
};
use std::collections::HashMap;

/// Texture region metadata resolved by an attachment loader.
///
/// Values are in texture pixels, as produced by an atlas packer:
/// `width`/`height` are the packed (possibly trimmed) size, `original_*` the
/// untrimmed image size, `offset_*` the position of the trimmed rect inside
/// the untrimmed image. `rotate` marks regions stored rotated in the page;
/// it only matters to renderers mapping UVs.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureRegion {
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: f32,
    pub height: f32,
    pub original_width: f32,
    pub original_height: f32,
    pub rotate: bool,
}

/// Factory consulted for every attachment while a skeleton decodes.
///
/// Implementations typically resolve `path` against packed texture data and
/// bind a [`TextureRegion`] to the attachment they return. Returning
/// `Ok(None)` marks the attachment unsupported: the decoder still consumes
/// its bytes so the stream stays aligned, but registers nothing in the skin.
/// An `Err` aborts the whole decode.
pub trait AttachmentLoader {
    fn new_region(
        &mut self,
        skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<RegionAttachment>, Error>;

    fn new_bounding_box(
        &mut self,
        skin: &str,
        name: &str,
    ) -> Result<Option<BoundingBoxAttachment>, Error>;

    fn new_mesh(
        &mut self,
        skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<MeshAttachment>, Error>;

    fn new_skinned_mesh(
        &mut self,
        skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<SkinnedMeshAttachment>, Error>;
}

/// Accepts every attachment without binding texture regions.
///
/// Geometry still decodes in full; region-dependent fields keep their
/// identity defaults. Useful for tooling that inspects rig data without
/// caring about textures.
#[derive(Copy, Clone, Debug, Default)]
pub struct RegionlessLoader;

impl AttachmentLoader for RegionlessLoader {
    fn new_region(
        &mut self,
        _skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<RegionAttachment>, Error> {
        Ok(Some(RegionAttachment::new(name, path)))
    }

    fn new_bounding_box(
        &mut self,
        _skin: &str,
        name: &str,
    ) -> Result<Option<BoundingBoxAttachment>, Error> {
        Ok(Some(BoundingBoxAttachment::new(name)))
    }

    fn new_mesh(
        &mut self,
        _skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<MeshAttachment>, Error> {
        Ok(Some(MeshAttachment::new(name, path)))
    }

    fn new_skinned_mesh(
        &mut self,
        _skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<SkinnedMeshAttachment>, Error> {
        Ok(Some(SkinnedMeshAttachment::new(name, path)))
    }
}

/// Resolves texture regions from a path-keyed map.
///
/// Region, mesh, and skinned-mesh attachments whose path has no entry are
/// reported unsupported and skipped. Bounding boxes carry no texture and are
/// always created.
#[derive(Clone, Debug, Default)]
pub struct RegionMapLoader {
    regions: HashMap<String, TextureRegion>,
}

impl RegionMapLoader {
    pub fn new(regions: HashMap<String, TextureRegion>) -> Self {
        Self { regions }
    }

    pub fn insert(&mut self, path: impl Into<String>, region: TextureRegion) {
        self.regions.insert(path.into(), region);
    }

    pub fn region(&self, path: &str) -> Option<&TextureRegion> {
        self.regions.get(path)
    }
}

impl AttachmentLoader for RegionMapLoader {
    fn new_region(
        &mut self,
        _skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<RegionAttachment>, Error> {
        let Some(region) = self.regions.get(path) else {
            return Ok(None);
        };
        let mut attachment = RegionAttachment::new(name, path);
        attachment.region = Some(*region);
        Ok(Some(attachment))
    }

    fn new_bounding_box(
        &mut self,
        _skin: &str,
        name: &str,
    ) -> Result<Option<BoundingBoxAttachment>, Error> {
        Ok(Some(BoundingBoxAttachment::new(name)))
    }

    fn new_mesh(
        &mut self,
        _skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<MeshAttachment>, Error> {
        let Some(region) = self.regions.get(path) else {
            return Ok(None);
        };
        let mut attachment = MeshAttachment::new(name, path);
        attachment.region = Some(*region);
        Ok(Some(attachment))
    }

    fn new_skinned_mesh(
        &mut self,
        _skin: &str,
        name: &str,
        path: &str,
    ) -> Result<Option<SkinnedMeshAttachment>, Error> {
        let Some(region) = self.regions.get(path) else {
            return Ok(None);
        };
        let mut attachment = SkinnedMeshAttachment::new(name, path);
        attachment.region = Some(*region);
        Ok(Some(attachment))
    }
}
