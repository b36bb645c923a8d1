use crate::TextureRegion;
use std::collections::HashMap;

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneData {
    pub name: String,
    /// Index of the parent bone; parents always precede their children.
    pub parent: Option<usize>,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
    pub length: f32,
    pub inherit_scale: bool,
    pub inherit_rotation: bool,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotData {
    pub name: String,
    pub bone: usize,
    pub color: [f32; 4],
    /// Attachment shown in the setup pose, if any.
    pub attachment: Option<String>,
    pub additive_blending: bool,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionAttachment {
    pub name: String,
    pub path: String,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
    pub width: f32,
    pub height: f32,
    pub color: [f32; 4],
    pub region: Option<TextureRegion>,
    /// Corner offsets in bone-local space, BL/UL/UR/BR order with x before y.
    /// Derived; recomputed by [`update_offset`](Self::update_offset).
    pub offset: [f32; 8],
}

impl RegionAttachment {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            width: 0.0,
            height: 0.0,
            color: [1.0, 1.0, 1.0, 1.0],
            region: None,
            offset: [0.0; 8],
        }
    }

    /// Recomputes the corner offsets from the local transform and the bound
    /// texture region. Without a region the footprint is the plain
    /// width-by-height rectangle; with one, atlas trim metadata shifts and
    /// shrinks it.
    pub fn update_offset(&mut self) {
        let (offset_x, offset_y, region_width, region_height, original_width, original_height) =
            match &self.region {
                Some(r) => (
                    r.offset_x,
                    r.offset_y,
                    r.width,
                    r.height,
                    r.original_width,
                    r.original_height,
                ),
                None => (0.0, 0.0, self.width, self.height, self.width, self.height),
            };
        let region_scale_x = if original_width == 0.0 {
            self.scale_x
        } else {
            self.width / original_width * self.scale_x
        };
        let region_scale_y = if original_height == 0.0 {
            self.scale_y
        } else {
            self.height / original_height * self.scale_y
        };
        let local_x = -self.width / 2.0 * self.scale_x + offset_x * region_scale_x;
        let local_y = -self.height / 2.0 * self.scale_y + offset_y * region_scale_y;
        let local_x2 = local_x + region_width * region_scale_x;
        let local_y2 = local_y + region_height * region_scale_y;
        let radians = self.rotation.to_radians();
        let (sin, cos) = radians.sin_cos();
        let local_x_cos = local_x * cos + self.x;
        let local_x_sin = local_x * sin;
        let local_y_cos = local_y * cos + self.y;
        let local_y_sin = local_y * sin;
        let local_x2_cos = local_x2 * cos + self.x;
        let local_x2_sin = local_x2 * sin;
        let local_y2_cos = local_y2 * cos + self.y;
        let local_y2_sin = local_y2 * sin;
        self.offset = [
            local_x_cos - local_y_sin,
            local_y_cos + local_x_sin,
            local_x_cos - local_y2_sin,
            local_y2_cos + local_x_sin,
            local_x2_cos - local_y2_sin,
            local_y2_cos + local_x2_sin,
            local_x2_cos - local_y_sin,
            local_y_cos + local_x2_sin,
        ];
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBoxAttachment {
    pub name: String,
    /// Flat polygon vertices: x0, y0, x1, y1, ...
    pub vertices: Vec<f32>,
}

impl BoundingBoxAttachment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertices: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshAttachment {
    pub name: String,
    pub path: String,
    pub region: Option<TextureRegion>,
    pub uvs: Vec<f32>,
    pub triangles: Vec<u16>,
    /// Flat vertex positions: x0, y0, x1, y1, ...
    pub vertices: Vec<f32>,
    pub color: [f32; 4],
    /// Number of floats at the start of `vertices` forming the hull.
    pub hull_length: usize,
    /// Editor-only metadata, present only when the export carried
    /// non-essential data. Absent is not the same as empty or zero.
    pub edges: Option<Vec<u32>>,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl MeshAttachment {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            region: None,
            uvs: Vec::new(),
            triangles: Vec::new(),
            vertices: Vec::new(),
            color: [1.0, 1.0, 1.0, 1.0],
            hull_length: 0,
            edges: None,
            width: None,
            height: None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkinnedMeshAttachment {
    pub name: String,
    pub path: String,
    pub region: Option<TextureRegion>,
    pub uvs: Vec<f32>,
    pub triangles: Vec<u16>,
    /// Bone influences per logical vertex.
    pub weights: Vec<Vec<VertexWeight>>,
    pub color: [f32; 4],
    pub hull_length: usize,
    pub edges: Option<Vec<u32>>,
    pub width: Option<f32>,
    pub height: Option<f32>,
}

impl SkinnedMeshAttachment {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            region: None,
            uvs: Vec::new(),
            triangles: Vec::new(),
            weights: Vec::new(),
            color: [1.0, 1.0, 1.0, 1.0],
            hull_length: 0,
            edges: None,
            width: None,
            height: None,
        }
    }

    /// Flat float length a deform keyframe for this attachment must cover:
    /// two components per bone influence.
    pub fn deform_length(&self) -> usize {
        self.weights.iter().map(|v| v.len()).sum::<usize>() * 2
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Attachment {
    Region(RegionAttachment),
    BoundingBox(BoundingBoxAttachment),
    Mesh(MeshAttachment),
    SkinnedMesh(SkinnedMeshAttachment),
}

impl Attachment {
    pub fn name(&self) -> &str {
        match self {
            Attachment::Region(a) => &a.name,
            Attachment::BoundingBox(a) => &a.name,
            Attachment::Mesh(a) => &a.name,
            Attachment::SkinnedMesh(a) => &a.name,
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkinData {
    pub name: String,
    /// Attachments keyed by name, one map per slot index.
    pub attachments: Vec<HashMap<String, Attachment>>,
}

impl SkinData {
    pub fn new(name: impl Into<String>, slot_count: usize) -> Self {
        Self {
            name: name.into(),
            attachments: vec![HashMap::new(); slot_count],
        }
    }

    pub fn attachment(&self, slot_index: usize, attachment_name: &str) -> Option<&Attachment> {
        self.attachments
            .get(slot_index)
            .and_then(|slot_map| slot_map.get(attachment_name))
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.iter().all(|slot_map| slot_map.is_empty())
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Curve {
    Linear,
    Stepped,
    Bezier {
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
    },
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RotateFrame {
    pub time: f32,
    pub angle: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RotateTimeline {
    pub bone_index: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec2Frame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TranslateTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScaleTimeline {
    pub bone_index: usize,
    pub frames: Vec<Vec2Frame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorTimeline {
    pub slot_index: usize,
    pub frames: Vec<ColorFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttachmentFrame {
    pub time: f32,
    pub name: Option<String>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttachmentTimeline {
    pub slot_index: usize,
    pub frames: Vec<AttachmentFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeformFrame {
    pub time: f32,
    /// Full vertex buffer for the keyframe, already resolved against the
    /// attachment's base vertices.
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeformTimeline {
    pub skin: String,
    pub slot_index: usize,
    pub attachment: String,
    pub frames: Vec<DeformFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrawOrderFrame {
    pub time: f32,
    /// Slot index drawn at each position; length equals the slot count.
    pub draw_order: Vec<usize>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    pub time: f32,
    /// Index into [`SkeletonData::events`].
    pub event_index: usize,
    pub int_value: i32,
    pub float_value: f32,
    pub string: Option<String>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventTimeline {
    pub events: Vec<Event>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Timeline {
    Rotate(RotateTimeline),
    Translate(TranslateTimeline),
    Scale(ScaleTimeline),
    Color(ColorTimeline),
    Attachment(AttachmentTimeline),
    Deform(DeformTimeline),
    DrawOrder(DrawOrderTimeline),
    Event(EventTimeline),
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Animation {
    pub name: String,
    pub timelines: Vec<Timeline>,
    /// Largest final-keyframe time across all timelines.
    pub duration: f32,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SkeletonData {
    pub name: String,
    pub hash: Option<String>,
    pub version: Option<String>,
    pub width: f32,
    pub height: f32,
    /// Present only when the export carried non-essential data.
    pub images_path: Option<String>,
    pub bones: Vec<BoneData>,
    pub slots: Vec<SlotData>,
    /// All skins in stream order; the default skin, when present, is first.
    pub skins: Vec<SkinData>,
    pub default_skin_index: Option<usize>,
    pub events: Vec<EventData>,
    pub animations: Vec<Animation>,
}

impl SkeletonData {
    pub fn default_skin(&self) -> Option<&SkinData> {
        self.default_skin_index.and_then(|i| self.skins.get(i))
    }

    pub fn skin(&self, name: &str) -> Option<&SkinData> {
        self.skins.iter().find(|s| s.name == name)
    }

    pub fn animation(&self, name: &str) -> Option<&Animation> {
        self.animations.iter().find(|a| a.name == name)
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::RegionAttachment;
    use crate::TextureRegion;

    fn assert_approx(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn update_offset_axis_aligned() {
        let mut attachment = RegionAttachment::new("a", "a");
        attachment.x = 10.0;
        attachment.y = 20.0;
        attachment.width = 2.0;
        attachment.height = 4.0;
        attachment.update_offset();

        let expected = [
            9.0, 18.0, // BL
            9.0, 22.0, // UL
            11.0, 22.0, // UR
            11.0, 18.0, // BR
        ];
        for (actual, expected) in attachment.offset.iter().zip(expected) {
            assert_approx(*actual, expected);
        }
    }

    #[test]
    fn update_offset_rotated_quarter_turn() {
        let mut attachment = RegionAttachment::new("a", "a");
        attachment.x = 10.0;
        attachment.y = 20.0;
        attachment.width = 2.0;
        attachment.height = 4.0;
        attachment.rotation = 90.0;
        attachment.update_offset();

        // Rotating (x, y) by 90 degrees maps it to (-y, x).
        let expected = [
            12.0, 19.0, // BL, from (-1, -2)
            8.0, 19.0, // UL, from (-1, 2)
            8.0, 21.0, // UR, from (1, 2)
            12.0, 21.0, // BR, from (1, -2)
        ];
        for (actual, expected) in attachment.offset.iter().zip(expected) {
            assert_approx(*actual, expected);
        }
    }

    #[test]
    fn update_offset_uses_trim_metadata() {
        // 4x4 image trimmed to its upper-right 2x2 quadrant.
        let mut attachment = RegionAttachment::new("a", "a");
        attachment.width = 4.0;
        attachment.height = 4.0;
        attachment.region = Some(TextureRegion {
            offset_x: 2.0,
            offset_y: 2.0,
            width: 2.0,
            height: 2.0,
            original_width: 4.0,
            original_height: 4.0,
            rotate: false,
        });
        attachment.update_offset();

        let expected = [
            0.0, 0.0, // BL
            0.0, 2.0, // UL
            2.0, 2.0, // UR
            2.0, 0.0, // BR
        ];
        for (actual, expected) in attachment.offset.iter().zip(expected) {
            assert_approx(*actual, expected);
        }
    }
}
