//! Binary `.skel` loader for 2.1-generation skeleton exports.
//!
//! The loader is IO-free: it operates on an in-memory byte slice and
//! consumes it strictly forward. Sections the model does not retain (IK
//! constraint data, flip keys) are still consumed byte-exactly to keep the
//! cursor aligned.

use crate::{
    Animation, Attachment, AttachmentFrame, AttachmentLoader, AttachmentTimeline, BoneData,
    ColorFrame, ColorTimeline, Curve, DeformFrame, DeformTimeline, DrawOrderFrame,
    DrawOrderTimeline, Error, Event, EventData, EventTimeline, RegionlessLoader, RotateFrame,
    RotateTimeline, ScaleTimeline, SkeletonData, SkinData, SlotData, Timeline, TranslateTimeline,
    Vec2Frame, VertexWeight,
};
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};

const TIMELINE_SCALE: u8 = 0;
const TIMELINE_ROTATE: u8 = 1;
const TIMELINE_TRANSLATE: u8 = 2;
const TIMELINE_ATTACHMENT: u8 = 3;
const TIMELINE_COLOR: u8 = 4;
const TIMELINE_FLIP_X: u8 = 5;
const TIMELINE_FLIP_Y: u8 = 6;

const CURVE_STEPPED: u8 = 1;
const CURVE_BEZIER: u8 = 2;

const ATTACHMENT_REGION: u8 = 0;
const ATTACHMENT_BOUNDING_BOX: u8 = 1;
const ATTACHMENT_MESH: u8 = 2;
const ATTACHMENT_SKINNED_MESH: u8 = 3;

const DEFAULT_SKIN: &str = "default";

#[derive(Clone, Debug)]
struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn eof(&self) -> Error {
        Error::TruncatedInput {
            offset: self.cursor,
        }
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        if self.cursor >= self.bytes.len() {
            return Err(self.eof());
        }
        let b = self.bytes[self.cursor];
        self.cursor += 1;
        Ok(b)
    }

    fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    fn read_i16_be(&mut self) -> Result<i16, Error> {
        if self.remaining() < 2 {
            return Err(self.eof());
        }
        let v = BigEndian::read_i16(&self.bytes[self.cursor..self.cursor + 2]);
        self.cursor += 2;
        Ok(v)
    }

    // Part of the wire primitive set; no 2.1 field currently carries one.
    #[allow(dead_code)]
    fn read_i32_be(&mut self) -> Result<i32, Error> {
        if self.remaining() < 4 {
            return Err(self.eof());
        }
        let v = BigEndian::read_i32(&self.bytes[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(v)
    }

    fn read_f32_be(&mut self) -> Result<f32, Error> {
        if self.remaining() < 4 {
            return Err(self.eof());
        }
        let v = BigEndian::read_f32(&self.bytes[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(v)
    }

    /// 1 to 5 bytes, 7 payload bits each (the 5th contributes 4), low groups
    /// first, high bit set on continuation bytes. With `optimize_positive`
    /// the raw value is the result; without it the value is zigzag-decoded.
    fn read_varint(&mut self, optimize_positive: bool) -> Result<i32, Error> {
        let mut b = self.read_u8()?;
        let mut value: u32 = (b & 0x7F) as u32;
        if (b & 0x80) != 0 {
            b = self.read_u8()?;
            value |= ((b & 0x7F) as u32) << 7;
            if (b & 0x80) != 0 {
                b = self.read_u8()?;
                value |= ((b & 0x7F) as u32) << 14;
                if (b & 0x80) != 0 {
                    b = self.read_u8()?;
                    value |= ((b & 0x7F) as u32) << 21;
                    if (b & 0x80) != 0 {
                        b = self.read_u8()?;
                        value |= ((b & 0x7F) as u32) << 28;
                    }
                }
            }
        }

        if optimize_positive {
            Ok(value as i32)
        } else {
            Ok((value >> 1) as i32 ^ -((value & 1) as i32))
        }
    }

    /// Element count for a section. Every decoded element consumes at least
    /// one byte, so a valid count never exceeds the remaining input.
    fn read_count(&mut self) -> Result<usize, Error> {
        let offset = self.cursor;
        let value = self.read_varint(true)?;
        if value < 0 {
            return Err(Error::InvalidData {
                message: format!("negative count {value} at offset {offset}"),
            });
        }
        let value = value as usize;
        if value > self.remaining() {
            return Err(Error::TruncatedInput { offset });
        }
        Ok(value)
    }

    /// Length-prefixed modified UTF-8. The prefix counts UTF-16 code units
    /// plus one; 0 is a null string and 1 an empty one.
    fn read_string(&mut self) -> Result<Option<String>, Error> {
        let offset = self.cursor;
        let char_count = match self.read_varint(true)? {
            0 => return Ok(None),
            1 => return Ok(Some(String::new())),
            n if n < 0 => {
                return Err(Error::InvalidData {
                    message: format!("negative string length {n} at offset {offset}"),
                });
            }
            n => (n - 1) as usize,
        };
        if char_count > self.remaining() {
            return Err(Error::TruncatedInput { offset });
        }
        let mut out = String::with_capacity(char_count);
        let mut units_read = 0usize;
        while units_read < char_count {
            let b = self.read_u8()?;
            if b > 127 {
                return self.read_string_slow(out, char_count, units_read, b);
            }
            out.push(b as char);
            units_read += 1;
        }
        Ok(Some(out))
    }

    /// Continues a string read after the first non-ASCII byte. Each UTF-16
    /// code unit is 1 to 3 bytes, dispatched on the leading nibble; astral
    /// characters arrive as CESU-8 surrogate pairs and are recombined.
    fn read_string_slow(
        &mut self,
        mut out: String,
        char_count: usize,
        units_read: usize,
        first: u8,
    ) -> Result<Option<String>, Error> {
        let start_offset = self.cursor - 1;
        let mut units: Vec<u16> = Vec::with_capacity(char_count - units_read);
        let mut b = first;
        loop {
            let offset = self.cursor - 1;
            let unit: u16 = match b >> 4 {
                0..=7 => b as u16,
                12 | 13 => {
                    let b2 = self.read_u8()?;
                    (((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16
                }
                14 => {
                    let b2 = self.read_u8()?;
                    let b3 = self.read_u8()?;
                    (((b & 0x0F) as u16) << 12)
                        | (((b2 & 0x3F) as u16) << 6)
                        | (b3 & 0x3F) as u16
                }
                _ => return Err(Error::MalformedString { offset, byte: b }),
            };
            units.push(unit);
            if units_read + units.len() >= char_count {
                break;
            }
            b = self.read_u8()?;
        }
        let tail = String::from_utf16(&units).map_err(|_| Error::MalformedString {
            offset: start_offset,
            byte: first,
        })?;
        out.push_str(&tail);
        Ok(Some(out))
    }

    fn read_color_rgba(&mut self) -> Result<[f32; 4], Error> {
        Ok([
            self.read_u8()? as f32 / 255.0,
            self.read_u8()? as f32 / 255.0,
            self.read_u8()? as f32 / 255.0,
            self.read_u8()? as f32 / 255.0,
        ])
    }
}

fn read_index(input: &mut BinaryInput<'_>, len: usize, what: &str) -> Result<usize, Error> {
    let offset = input.cursor;
    let value = input.read_varint(true)?;
    if value < 0 || value as usize >= len {
        return Err(Error::InvalidData {
            message: format!("{what} {value} out of range (len {len}) at offset {offset}"),
        });
    }
    Ok(value as usize)
}

fn read_nonnegative_varint(
    input: &mut BinaryInput<'_>,
    what: &str,
) -> Result<usize, Error> {
    let offset = input.cursor;
    let value = input.read_varint(true)?;
    if value < 0 {
        return Err(Error::InvalidData {
            message: format!("negative {what} {value} at offset {offset}"),
        });
    }
    Ok(value as usize)
}

fn read_float_array(input: &mut BinaryInput<'_>, scale: f32) -> Result<Vec<f32>, Error> {
    let count = input.read_count()?;
    let mut values = Vec::with_capacity(count);
    if scale == 1.0 {
        for _ in 0..count {
            values.push(input.read_f32_be()?);
        }
    } else {
        for _ in 0..count {
            values.push(input.read_f32_be()? * scale);
        }
    }
    Ok(values)
}

fn read_short_array(input: &mut BinaryInput<'_>) -> Result<Vec<u16>, Error> {
    let count = input.read_count()?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(input.read_i16_be()? as u16);
    }
    Ok(values)
}

fn read_int_array(input: &mut BinaryInput<'_>) -> Result<Vec<u32>, Error> {
    let count = input.read_count()?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(read_nonnegative_varint(input, "int array value")? as u32);
    }
    Ok(values)
}

/// One running cursor walks the declared flat entry count: each logical
/// vertex spends one entry on its bone count and four per influence.
fn read_vertex_weights(
    input: &mut BinaryInput<'_>,
    bones_len: usize,
    scale: f32,
) -> Result<Vec<Vec<VertexWeight>>, Error> {
    let entry_count = read_nonnegative_varint(input, "weighted vertex count")?;
    let mut weights = Vec::new();
    let mut consumed = 0usize;
    while consumed < entry_count {
        let offset = input.cursor;
        let bone_count = input.read_f32_be()? as i32;
        if bone_count < 0 {
            return Err(Error::InvalidData {
                message: format!("negative bone count {bone_count} at offset {offset}"),
            });
        }
        consumed += 1;
        let bone_count = bone_count as usize;
        // Each influence is four 4-byte floats.
        if bone_count > input.remaining() / 16 {
            return Err(input.eof());
        }
        let mut influences = Vec::with_capacity(bone_count);
        for _ in 0..bone_count {
            let bone_offset = input.cursor;
            let bone = input.read_f32_be()? as i32;
            if bone < 0 || bone as usize >= bones_len {
                return Err(Error::InvalidData {
                    message: format!(
                        "weight bone index {bone} out of range (len {bones_len}) at offset {bone_offset}"
                    ),
                });
            }
            let x = input.read_f32_be()? * scale;
            let y = input.read_f32_be()? * scale;
            let weight = input.read_f32_be()?;
            influences.push(VertexWeight {
                bone: bone as usize,
                x,
                y,
                weight,
            });
        }
        consumed += 4 * bone_count;
        weights.push(influences);
    }
    Ok(weights)
}

/// The curve byte trails every keyframe except the last: 1 is stepped, 2 is
/// bezier followed by four control floats, anything else is linear.
fn read_curve(
    input: &mut BinaryInput<'_>,
    frame: usize,
    frame_count: usize,
) -> Result<Curve, Error> {
    if frame + 1 >= frame_count {
        return Ok(Curve::Linear);
    }
    match input.read_u8()? {
        CURVE_STEPPED => Ok(Curve::Stepped),
        CURVE_BEZIER => Ok(Curve::Bezier {
            cx1: input.read_f32_be()?,
            cy1: input.read_f32_be()?,
            cx2: input.read_f32_be()?,
            cy2: input.read_f32_be()?,
        }),
        _ => Ok(Curve::Linear),
    }
}

fn read_attachment<L: AttachmentLoader>(
    input: &mut BinaryInput<'_>,
    loader: &mut L,
    skin_name: &str,
    key: &str,
    bones_len: usize,
    nonessential: bool,
    scale: f32,
) -> Result<Option<Attachment>, Error> {
    let name = match input.read_string()? {
        Some(name) => name,
        None => key.to_string(),
    };
    let kind_offset = input.cursor;
    let kind = input.read_u8()?;
    match kind {
        ATTACHMENT_REGION => {
            let path = input.read_string()?.unwrap_or_else(|| name.clone());
            let region = loader.new_region(skin_name, &name, &path)?;
            let x = input.read_f32_be()? * scale;
            let y = input.read_f32_be()? * scale;
            let scale_x = input.read_f32_be()?;
            let scale_y = input.read_f32_be()?;
            let rotation = input.read_f32_be()?;
            let width = input.read_f32_be()? * scale;
            let height = input.read_f32_be()? * scale;
            let color = input.read_color_rgba()?;
            Ok(region.map(|mut attachment| {
                attachment.x = x;
                attachment.y = y;
                attachment.scale_x = scale_x;
                attachment.scale_y = scale_y;
                attachment.rotation = rotation;
                attachment.width = width;
                attachment.height = height;
                attachment.color = color;
                attachment.update_offset();
                Attachment::Region(attachment)
            }))
        }
        ATTACHMENT_BOUNDING_BOX => {
            let bounding_box = loader.new_bounding_box(skin_name, &name)?;
            let vertices = read_float_array(input, scale)?;
            Ok(bounding_box.map(|mut attachment| {
                attachment.vertices = vertices;
                Attachment::BoundingBox(attachment)
            }))
        }
        ATTACHMENT_MESH => {
            let path = input.read_string()?.unwrap_or_else(|| name.clone());
            let mesh = loader.new_mesh(skin_name, &name, &path)?;
            let uvs = read_float_array(input, 1.0)?;
            let triangles = read_short_array(input)?;
            let vertices = read_float_array(input, scale)?;
            let color = input.read_color_rgba()?;
            let hull_length = 2 * read_nonnegative_varint(input, "hull length")?;
            let mut edges = None;
            let mut width = None;
            let mut height = None;
            if nonessential {
                edges = Some(read_int_array(input)?);
                width = Some(input.read_f32_be()? * scale);
                height = Some(input.read_f32_be()? * scale);
            }
            Ok(mesh.map(|mut attachment| {
                attachment.uvs = uvs;
                attachment.triangles = triangles;
                attachment.vertices = vertices;
                attachment.color = color;
                attachment.hull_length = hull_length;
                attachment.edges = edges;
                attachment.width = width;
                attachment.height = height;
                Attachment::Mesh(attachment)
            }))
        }
        ATTACHMENT_SKINNED_MESH => {
            let path = input.read_string()?.unwrap_or_else(|| name.clone());
            let skinned_mesh = loader.new_skinned_mesh(skin_name, &name, &path)?;
            let uvs = read_float_array(input, 1.0)?;
            let triangles = read_short_array(input)?;
            let weights = read_vertex_weights(input, bones_len, scale)?;
            let color = input.read_color_rgba()?;
            let hull_length = 2 * read_nonnegative_varint(input, "hull length")?;
            let mut edges = None;
            let mut width = None;
            let mut height = None;
            if nonessential {
                edges = Some(read_int_array(input)?);
                width = Some(input.read_f32_be()? * scale);
                height = Some(input.read_f32_be()? * scale);
            }
            Ok(skinned_mesh.map(|mut attachment| {
                attachment.uvs = uvs;
                attachment.triangles = triangles;
                attachment.weights = weights;
                attachment.color = color;
                attachment.hull_length = hull_length;
                attachment.edges = edges;
                attachment.width = width;
                attachment.height = height;
                Attachment::SkinnedMesh(attachment)
            }))
        }
        kind => Err(Error::UnknownAttachmentType {
            kind,
            offset: kind_offset,
        }),
    }
}

/// Reads one skin body. A zero slot-entry count yields `None`; the caller
/// decides whether that means "no skin" (default) or an empty one (named).
fn read_skin<L: AttachmentLoader>(
    input: &mut BinaryInput<'_>,
    loader: &mut L,
    name: &str,
    bones_len: usize,
    slots_len: usize,
    nonessential: bool,
    scale: f32,
) -> Result<Option<SkinData>, Error> {
    let entry_count = input.read_count()?;
    if entry_count == 0 {
        return Ok(None);
    }
    let mut skin = SkinData::new(name, slots_len);
    for _ in 0..entry_count {
        let slot_index = read_index(input, slots_len, "skin slot index")?;
        let attachment_count = input.read_count()?;
        for _ in 0..attachment_count {
            let key = input.read_string()?.unwrap_or_default();
            if let Some(attachment) =
                read_attachment(input, loader, name, &key, bones_len, nonessential, scale)?
            {
                skin.attachments[slot_index].insert(key, attachment);
            }
        }
    }
    Ok(Some(skin))
}

fn read_animation(
    input: &mut BinaryInput<'_>,
    name: &str,
    bones_len: usize,
    slots_len: usize,
    skins: &[SkinData],
    events: &[EventData],
    scale: f32,
) -> Result<Animation, Error> {
    let mut timelines = Vec::new();
    let mut duration = 0.0f32;

    // Slot timelines.
    let slot_group_count = input.read_count()?;
    for _ in 0..slot_group_count {
        let slot_index = read_index(input, slots_len, "timeline slot index")?;
        let timeline_count = input.read_count()?;
        for _ in 0..timeline_count {
            let kind_offset = input.cursor;
            let kind = input.read_u8()?;
            let frame_count = input.read_count()?;
            match kind {
                TIMELINE_COLOR => {
                    let mut frames = Vec::with_capacity(frame_count);
                    for frame in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let color = input.read_color_rgba()?;
                        let curve = read_curve(input, frame, frame_count)?;
                        frames.push(ColorFrame { time, color, curve });
                    }
                    if let Some(last) = frames.last() {
                        duration = duration.max(last.time);
                    }
                    timelines.push(Timeline::Color(ColorTimeline { slot_index, frames }));
                }
                TIMELINE_ATTACHMENT => {
                    let mut frames = Vec::with_capacity(frame_count);
                    for _ in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let attachment_name = input.read_string()?;
                        frames.push(AttachmentFrame {
                            time,
                            name: attachment_name,
                        });
                    }
                    if let Some(last) = frames.last() {
                        duration = duration.max(last.time);
                    }
                    timelines.push(Timeline::Attachment(AttachmentTimeline {
                        slot_index,
                        frames,
                    }));
                }
                kind => {
                    return Err(Error::UnknownTimelineType {
                        kind,
                        offset: kind_offset,
                    });
                }
            }
        }
    }

    // Bone timelines.
    let bone_group_count = input.read_count()?;
    for _ in 0..bone_group_count {
        let bone_index = read_index(input, bones_len, "timeline bone index")?;
        let timeline_count = input.read_count()?;
        for _ in 0..timeline_count {
            let kind_offset = input.cursor;
            let kind = input.read_u8()?;
            let frame_count = input.read_count()?;
            match kind {
                TIMELINE_ROTATE => {
                    let mut frames = Vec::with_capacity(frame_count);
                    for frame in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let angle = input.read_f32_be()?;
                        let curve = read_curve(input, frame, frame_count)?;
                        frames.push(RotateFrame { time, angle, curve });
                    }
                    if let Some(last) = frames.last() {
                        duration = duration.max(last.time);
                    }
                    timelines.push(Timeline::Rotate(RotateTimeline { bone_index, frames }));
                }
                TIMELINE_TRANSLATE | TIMELINE_SCALE => {
                    // Scale keys hold multipliers, so the position scale
                    // never applies to them.
                    let timeline_scale = if kind == TIMELINE_TRANSLATE {
                        scale
                    } else {
                        1.0
                    };
                    let mut frames = Vec::with_capacity(frame_count);
                    for frame in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let x = input.read_f32_be()? * timeline_scale;
                        let y = input.read_f32_be()? * timeline_scale;
                        let curve = read_curve(input, frame, frame_count)?;
                        frames.push(Vec2Frame { time, x, y, curve });
                    }
                    if let Some(last) = frames.last() {
                        duration = duration.max(last.time);
                    }
                    timelines.push(if kind == TIMELINE_TRANSLATE {
                        Timeline::Translate(TranslateTimeline { bone_index, frames })
                    } else {
                        Timeline::Scale(ScaleTimeline { bone_index, frames })
                    });
                }
                TIMELINE_FLIP_X | TIMELINE_FLIP_Y => {
                    // Legacy flip keys: fixed-size records, nothing retained.
                    for _ in 0..frame_count {
                        let _ = input.read_f32_be()?; // time
                        let _ = input.read_bool()?; // flip
                    }
                }
                kind => {
                    return Err(Error::UnknownTimelineType {
                        kind,
                        offset: kind_offset,
                    });
                }
            }
        }
    }

    // IK constraint timelines are carried by the stream but have no
    // counterpart in the model; consume them to stay aligned.
    let ik_timeline_count = input.read_count()?;
    for _ in 0..ik_timeline_count {
        let _ = input.read_varint(true)?; // constraint index
        let frame_count = input.read_count()?;
        for frame in 0..frame_count {
            let _ = input.read_f32_be()?; // time
            let _ = input.read_f32_be()?; // mix
            let _ = input.read_u8()?; // bend direction
            let _ = read_curve(input, frame, frame_count)?;
        }
    }

    // FFD timelines.
    let ffd_count = input.read_count()?;
    for _ in 0..ffd_count {
        let skin_index = read_index(input, skins.len(), "ffd skin index")?;
        let skin = &skins[skin_index];
        let slot_entry_count = input.read_count()?;
        for _ in 0..slot_entry_count {
            let slot_index = read_index(input, slots_len, "ffd slot index")?;
            let attachment_count = input.read_count()?;
            for _ in 0..attachment_count {
                let name_offset = input.cursor;
                let attachment_name =
                    input.read_string()?.ok_or_else(|| Error::InvalidData {
                        message: format!("missing ffd attachment name at offset {name_offset}"),
                    })?;
                let attachment = skin.attachment(slot_index, &attachment_name).ok_or_else(|| {
                    Error::InvalidData {
                        message: format!(
                            "ffd attachment {attachment_name:?} not found in skin {:?}",
                            skin.name
                        ),
                    }
                })?;
                let (vertex_count, base) = match attachment {
                    Attachment::Mesh(mesh) => {
                        (mesh.vertices.len(), Some(mesh.vertices.as_slice()))
                    }
                    Attachment::SkinnedMesh(skinned) => (skinned.deform_length(), None),
                    _ => {
                        return Err(Error::InvalidData {
                            message: format!(
                                "ffd attachment {attachment_name:?} in skin {:?} is not a mesh",
                                skin.name
                            ),
                        });
                    }
                };
                let frame_count = input.read_count()?;
                let mut frames = Vec::with_capacity(frame_count);
                for frame in 0..frame_count {
                    let time = input.read_f32_be()?;
                    let end = read_nonnegative_varint(input, "ffd vertex count")?;
                    let vertices = if end == 0 {
                        // An empty range keys the setup shape.
                        match base {
                            Some(base) => base.to_vec(),
                            None => vec![0.0; vertex_count],
                        }
                    } else {
                        let start = read_nonnegative_varint(input, "ffd vertex offset")?;
                        if start + end > vertex_count {
                            return Err(Error::InvalidData {
                                message: format!(
                                    "ffd vertex range {start}..{} exceeds length {vertex_count} for attachment {attachment_name:?}",
                                    start + end
                                ),
                            });
                        }
                        let mut vertices = vec![0.0f32; vertex_count];
                        if scale == 1.0 {
                            for v in &mut vertices[start..start + end] {
                                *v = input.read_f32_be()?;
                            }
                        } else {
                            for v in &mut vertices[start..start + end] {
                                *v = input.read_f32_be()? * scale;
                            }
                        }
                        if let Some(base) = base {
                            for (v, b) in vertices.iter_mut().zip(base) {
                                *v += b;
                            }
                        }
                        vertices
                    };
                    let curve = read_curve(input, frame, frame_count)?;
                    frames.push(DeformFrame {
                        time,
                        vertices,
                        curve,
                    });
                }
                if let Some(last) = frames.last() {
                    duration = duration.max(last.time);
                }
                timelines.push(Timeline::Deform(DeformTimeline {
                    skin: skin.name.clone(),
                    slot_index,
                    attachment: attachment_name,
                    frames,
                }));
            }
        }
    }

    // Draw order timeline. The frame time trails the offset pairs in this
    // generation of the format.
    let draw_order_count = input.read_count()?;
    if draw_order_count > 0 {
        let mut frames = Vec::with_capacity(draw_order_count);
        for _ in 0..draw_order_count {
            let offset_count = input.read_count()?;
            let mut draw_order = vec![usize::MAX; slots_len];
            let mut unchanged = Vec::with_capacity(slots_len.saturating_sub(offset_count));
            let mut original_index = 0usize;
            for _ in 0..offset_count {
                let entry_offset = input.cursor;
                let slot_index = read_index(input, slots_len, "draw order slot index")?;
                if slot_index < original_index {
                    return Err(Error::InvalidData {
                        message: format!(
                            "draw order slot {slot_index} out of ascending order at offset {entry_offset}"
                        ),
                    });
                }
                while original_index != slot_index {
                    unchanged.push(original_index);
                    original_index += 1;
                }
                let offset = input.read_varint(true)? as isize;
                let dst = original_index as isize + offset;
                if dst < 0 || dst as usize >= slots_len {
                    return Err(Error::InvalidData {
                        message: format!(
                            "draw order offset {offset} for slot {slot_index} lands out of range at offset {entry_offset}"
                        ),
                    });
                }
                let dst = dst as usize;
                if draw_order[dst] != usize::MAX {
                    return Err(Error::InvalidData {
                        message: format!(
                            "draw order position {dst} assigned twice at offset {entry_offset}"
                        ),
                    });
                }
                draw_order[dst] = original_index;
                original_index += 1;
            }
            while original_index < slots_len {
                unchanged.push(original_index);
                original_index += 1;
            }
            // Unlisted slots fill the remaining positions in ascending order.
            let mut unchanged_index = unchanged.len();
            for i in (0..slots_len).rev() {
                if draw_order[i] == usize::MAX {
                    unchanged_index -= 1;
                    draw_order[i] = unchanged[unchanged_index];
                }
            }
            let time = input.read_f32_be()?;
            frames.push(DrawOrderFrame { time, draw_order });
        }
        if let Some(last) = frames.last() {
            duration = duration.max(last.time);
        }
        timelines.push(Timeline::DrawOrder(DrawOrderTimeline { frames }));
    }

    // Event timeline.
    let event_count = input.read_count()?;
    if event_count > 0 {
        let mut frame_events = Vec::with_capacity(event_count);
        for _ in 0..event_count {
            let time = input.read_f32_be()?;
            let event_index = read_index(input, events.len(), "event index")?;
            let int_value = input.read_varint(false)?;
            let float_value = input.read_f32_be()?;
            let string = if input.read_bool()? {
                input.read_string()?
            } else {
                events[event_index].string.clone()
            };
            frame_events.push(Event {
                time,
                event_index,
                int_value,
                float_value,
                string,
            });
        }
        if let Some(last) = frame_events.last() {
            duration = duration.max(last.time);
        }
        timelines.push(Timeline::Event(EventTimeline {
            events: frame_events,
        }));
    }

    trace!(
        "animation {name:?}: {} timelines, duration {duration}",
        timelines.len()
    );

    Ok(Animation {
        name: name.to_string(),
        timelines,
        duration,
    })
}

/// Decoder for binary skeleton exports.
///
/// Holds the attachment factory and the position scale applied while
/// decoding. One instance can decode any number of skeletons.
#[derive(Clone, Debug)]
pub struct SkeletonBinary<L> {
    loader: L,
    scale: f32,
}

impl<L: AttachmentLoader> SkeletonBinary<L> {
    pub fn new(loader: L) -> Self {
        Self { loader, scale: 1.0 }
    }

    /// Scale applied to all position-like values while decoding. Non-finite
    /// values fall back to 1.0.
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = if scale.is_finite() { scale } else { 1.0 };
        self
    }

    /// Decodes a complete skeleton. All-or-nothing: any failure surfaces as
    /// [`Error::SkeletonRead`] and no partial model escapes.
    pub fn read_skeleton_data(
        &mut self,
        bytes: &[u8],
        name: &str,
    ) -> Result<SkeletonData, Error> {
        self.read_inner(bytes, name)
            .map_err(|source| Error::SkeletonRead {
                source: Box::new(source),
            })
    }

    fn read_inner(&mut self, bytes: &[u8], name: &str) -> Result<SkeletonData, Error> {
        let scale = self.scale;
        let mut input = BinaryInput::new(bytes);

        let hash = input.read_string()?;
        let version = input.read_string()?;
        let width = input.read_f32_be()?;
        let height = input.read_f32_be()?;
        let nonessential = input.read_bool()?;
        let images_path = if nonessential {
            input.read_string()?
        } else {
            None
        };
        trace!(
            "skeleton {name:?}: version={version:?} size={width}x{height} nonessential={nonessential}"
        );

        // Bones. The wire stores parent index plus one; zero marks a root.
        let bone_count = input.read_count()?;
        let mut bones: Vec<BoneData> = Vec::with_capacity(bone_count);
        for _ in 0..bone_count {
            let bone_name = input.read_string()?.unwrap_or_default();
            let parent_offset = input.cursor;
            let parent_raw = input.read_varint(true)?;
            let parent = if parent_raw == 0 {
                None
            } else if parent_raw > 0 && ((parent_raw - 1) as usize) < bones.len() {
                Some((parent_raw - 1) as usize)
            } else {
                return Err(Error::InvalidData {
                    message: format!(
                        "bone {bone_name:?} parent reference {parent_raw} out of range at offset {parent_offset}"
                    ),
                });
            };
            let x = input.read_f32_be()? * scale;
            let y = input.read_f32_be()? * scale;
            let scale_x = input.read_f32_be()?;
            let scale_y = input.read_f32_be()?;
            let rotation = input.read_f32_be()?;
            let length = input.read_f32_be()? * scale;
            let _ = input.read_bool()?; // flipX
            let _ = input.read_bool()?; // flipY
            let inherit_scale = input.read_bool()?;
            let inherit_rotation = input.read_bool()?;
            bones.push(BoneData {
                name: bone_name,
                parent,
                x,
                y,
                scale_x,
                scale_y,
                rotation,
                length,
                inherit_scale,
                inherit_rotation,
            });
        }

        // IK constraint definitions are carried by the stream but have no
        // counterpart in the model; consume them to stay aligned.
        let ik_count = input.read_count()?;
        for _ in 0..ik_count {
            let _ = input.read_string()?; // name
            let ik_bone_count = input.read_count()?;
            for _ in 0..ik_bone_count {
                let _ = input.read_varint(true)?; // bone index
            }
            let _ = input.read_varint(true)?; // target bone index
            let _ = input.read_f32_be()?; // mix
            let _ = input.read_u8()?; // bend direction
        }

        // Slots.
        let slot_count = input.read_count()?;
        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let slot_name = input.read_string()?.unwrap_or_default();
            let bone = read_index(&mut input, bones.len(), "slot bone index")?;
            let color = input.read_color_rgba()?;
            let attachment = input.read_string()?;
            let additive_blending = input.read_bool()?;
            slots.push(SlotData {
                name: slot_name,
                bone,
                color,
                attachment,
                additive_blending,
            });
        }

        // Skins. A default skin with no slot entries is not registered at
        // all; a named skin with none still becomes a present-but-empty skin.
        let mut skins = Vec::new();
        let mut default_skin_index = None;
        if let Some(skin) = read_skin(
            &mut input,
            &mut self.loader,
            DEFAULT_SKIN,
            bones.len(),
            slots.len(),
            nonessential,
            scale,
        )? {
            default_skin_index = Some(skins.len());
            skins.push(skin);
        }
        let named_skin_count = input.read_count()?;
        for _ in 0..named_skin_count {
            let skin_name = input.read_string()?.unwrap_or_default();
            let skin = read_skin(
                &mut input,
                &mut self.loader,
                &skin_name,
                bones.len(),
                slots.len(),
                nonessential,
                scale,
            )?
            .unwrap_or_else(|| SkinData::new(&skin_name, slots.len()));
            skins.push(skin);
        }

        // Events.
        let event_count = input.read_count()?;
        let mut events = Vec::with_capacity(event_count);
        for _ in 0..event_count {
            let event_name = input.read_string()?.unwrap_or_default();
            let int_value = input.read_varint(false)?;
            let float_value = input.read_f32_be()?;
            let string = input.read_string()?;
            events.push(EventData {
                name: event_name,
                int_value,
                float_value,
                string,
            });
        }

        // Animations.
        let animation_count = input.read_count()?;
        let mut animations = Vec::with_capacity(animation_count);
        for _ in 0..animation_count {
            let animation_name = input.read_string()?.unwrap_or_default();
            animations.push(read_animation(
                &mut input,
                &animation_name,
                bones.len(),
                slots.len(),
                &skins,
                &events,
                scale,
            )?);
        }

        debug!(
            "decoded skeleton {name:?}: {} bones, {} slots, {} skins, {} events, {} animations",
            bones.len(),
            slots.len(),
            skins.len(),
            events.len(),
            animations.len()
        );

        Ok(SkeletonData {
            name: name.to_string(),
            hash,
            version,
            width,
            height,
            images_path,
            bones,
            slots,
            skins,
            default_skin_index,
            events,
            animations,
        })
    }
}

impl SkeletonData {
    /// Decodes binary skeleton data with no texture regions bound.
    pub fn from_skel_bytes(bytes: &[u8], name: &str) -> Result<SkeletonData, Error> {
        Self::from_skel_bytes_with_scale(bytes, name, 1.0)
    }

    pub fn from_skel_bytes_with_scale(
        bytes: &[u8],
        name: &str,
        scale: f32,
    ) -> Result<SkeletonData, Error> {
        SkeletonBinary::new(RegionlessLoader)
            .with_scale(scale)
            .read_skeleton_data(bytes, name)
    }
}

#[cfg(test)]
mod tests {
    use super::{BinaryInput, read_curve};
    use crate::{Curve, Error};

    fn push_varint(out: &mut Vec<u8>, mut value: u32) {
        loop {
            let mut b = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                b |= 0x80;
            }
            out.push(b);
            if value == 0 {
                break;
            }
        }
    }

    fn push_varint_signed(out: &mut Vec<u8>, value: i32) {
        push_varint(out, ((value << 1) ^ (value >> 31)) as u32);
    }

    fn push_f32_be(out: &mut Vec<u8>, v: f32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    fn push_string(out: &mut Vec<u8>, s: Option<&str>) {
        let Some(s) = s else {
            push_varint(out, 0);
            return;
        };
        if s.is_empty() {
            push_varint(out, 1);
            return;
        }
        let units: Vec<u16> = s.encode_utf16().collect();
        push_varint(out, units.len() as u32 + 1);
        for unit in units {
            match unit {
                0x0000..=0x007F => out.push(unit as u8),
                0x0080..=0x07FF => {
                    out.push(0xC0 | (unit >> 6) as u8);
                    out.push(0x80 | (unit & 0x3F) as u8);
                }
                _ => {
                    out.push(0xE0 | (unit >> 12) as u8);
                    out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                    out.push(0x80 | (unit & 0x3F) as u8);
                }
            }
        }
    }

    fn read_string(bytes: &[u8]) -> Result<Option<String>, Error> {
        BinaryInput::new(bytes).read_string()
    }

    #[test]
    fn varint_unsigned_roundtrip() {
        for value in [
            0u32,
            1,
            0x7F,
            0x80,
            0x3FFF,
            0x4000,
            0x1F_FFFF,
            0x20_0000,
            0xFFF_FFFF,
            0x1000_0000,
            i32::MAX as u32,
        ] {
            let mut bytes = Vec::new();
            push_varint(&mut bytes, value);
            let mut input = BinaryInput::new(&bytes);
            assert_eq!(input.read_varint(true).unwrap(), value as i32);
            assert_eq!(input.remaining(), 0);
        }
    }

    #[test]
    fn varint_width_boundaries() {
        for (value, width) in [
            (0x7Fu32, 1usize),
            (0x80, 2),
            (0x3FFF, 2),
            (0x4000, 3),
            (0x1F_FFFF, 3),
            (0x20_0000, 4),
            (0xFFF_FFFF, 4),
            (0x1000_0000, 5),
        ] {
            let mut bytes = Vec::new();
            push_varint(&mut bytes, value);
            assert_eq!(bytes.len(), width, "value {value:#x}");
        }
    }

    #[test]
    fn varint_five_byte_unsigned_is_minus_one() {
        // All 32 bits set: 5 bytes on the wire, -1 when reinterpreted.
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        let mut input = BinaryInput::new(&bytes);
        assert_eq!(input.read_varint(true).unwrap(), -1);
    }

    #[test]
    fn varint_zigzag_roundtrip() {
        for value in [0i32, -1, 1, -2, 2, 123_456, -123_456, i32::MAX, i32::MIN] {
            let mut bytes = Vec::new();
            push_varint_signed(&mut bytes, value);
            let mut input = BinaryInput::new(&bytes);
            assert_eq!(input.read_varint(false).unwrap(), value, "value {value}");
        }
    }

    #[test]
    fn varint_zigzag_minus_one_is_single_byte() {
        let mut bytes = Vec::new();
        push_varint_signed(&mut bytes, -1);
        assert_eq!(bytes, [0x01]);
    }

    #[test]
    fn varint_truncated_errors() {
        let bytes = [0x80, 0x80];
        let mut input = BinaryInput::new(&bytes);
        assert!(matches!(
            input.read_varint(true),
            Err(Error::TruncatedInput { offset: 2 })
        ));
    }

    #[test]
    fn fixed_width_big_endian_reads() {
        let bytes = [
            0x3F, 0x80, 0x00, 0x00, // 1.0f
            0xC0, 0x00, 0x00, 0x00, // -2.0f
            0xFF, 0xFE, // -2i16
            0x00, 0x00, 0x01, 0x00, // 256i32
        ];
        let mut input = BinaryInput::new(&bytes);
        assert_eq!(input.read_f32_be().unwrap(), 1.0);
        assert_eq!(input.read_f32_be().unwrap(), -2.0);
        assert_eq!(input.read_i16_be().unwrap(), -2);
        assert_eq!(input.read_i32_be().unwrap(), 256);
        assert!(matches!(
            input.read_f32_be(),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn f32_is_bit_exact() {
        let value = f32::from_bits(0x7F80_0001); // signaling NaN payload
        let mut bytes = Vec::new();
        push_f32_be(&mut bytes, value);
        let mut input = BinaryInput::new(&bytes);
        assert_eq!(input.read_f32_be().unwrap().to_bits(), 0x7F80_0001);
    }

    #[test]
    fn string_null_and_empty() {
        assert_eq!(read_string(&[0x00]).unwrap(), None);
        assert_eq!(read_string(&[0x01]).unwrap(), Some(String::new()));
    }

    #[test]
    fn string_ascii() {
        let mut bytes = Vec::new();
        push_string(&mut bytes, Some("head"));
        assert_eq!(read_string(&bytes).unwrap().as_deref(), Some("head"));
    }

    #[test]
    fn string_two_and_three_byte_sequences() {
        for s in ["é", "€", "abcé", "über", "空手"] {
            let mut bytes = Vec::new();
            push_string(&mut bytes, Some(s));
            assert_eq!(read_string(&bytes).unwrap().as_deref(), Some(s));
        }
    }

    #[test]
    fn string_surrogate_pair_recombines() {
        // U+1F600 is two UTF-16 units, six bytes on the wire.
        let mut bytes = Vec::new();
        push_string(&mut bytes, Some("😀"));
        assert_eq!(bytes.len(), 1 + 6);
        assert_eq!(read_string(&bytes).unwrap().as_deref(), Some("😀"));
    }

    #[test]
    fn string_invalid_lead_nibble_errors() {
        // Length prefix says one unit; 0x85 has leading nibble 8.
        let bytes = [0x02, 0x85];
        assert!(matches!(
            read_string(&bytes),
            Err(Error::MalformedString {
                offset: 1,
                byte: 0x85
            })
        ));
    }

    #[test]
    fn string_unpaired_surrogate_errors() {
        // A lone high surrogate (U+D83D) cannot become a char.
        let bytes = [0x02, 0xED, 0xA0, 0xBD];
        assert!(matches!(
            read_string(&bytes),
            Err(Error::MalformedString { .. })
        ));
    }

    #[test]
    fn string_truncated_errors() {
        // Prefix promises three units but only one byte follows.
        let bytes = [0x04, b'a'];
        assert!(matches!(
            read_string(&bytes),
            Err(Error::TruncatedInput { .. })
        ));
    }

    #[test]
    fn count_validation() {
        let mut bytes = Vec::new();
        push_varint(&mut bytes, 5);
        let mut input = BinaryInput::new(&bytes);
        assert!(matches!(
            input.read_count(),
            Err(Error::TruncatedInput { offset: 0 })
        ));

        // Raw bit 31 set decodes negative.
        let mut bytes = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F];
        bytes.extend_from_slice(&[0u8; 16]);
        let mut input = BinaryInput::new(&bytes);
        assert!(matches!(input.read_count(), Err(Error::InvalidData { .. })));
    }

    #[test]
    fn color_bytes_normalize() {
        let bytes = [255, 0, 51, 102];
        let mut input = BinaryInput::new(&bytes);
        let color = input.read_color_rgba().unwrap();
        assert_eq!(color[0], 1.0);
        assert_eq!(color[1], 0.0);
        assert!((color[2] - 0.2).abs() < 1e-6);
        assert!((color[3] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn curve_byte_dispatch() {
        let mut bytes = Vec::new();
        bytes.push(1); // stepped
        bytes.push(2); // bezier
        push_f32_be(&mut bytes, 0.25);
        push_f32_be(&mut bytes, 0.0);
        push_f32_be(&mut bytes, 0.75);
        push_f32_be(&mut bytes, 1.0);
        bytes.push(0); // linear
        bytes.push(7); // unknown values are linear too
        let mut input = BinaryInput::new(&bytes);

        assert_eq!(read_curve(&mut input, 0, 2).unwrap(), Curve::Stepped);
        assert_eq!(
            read_curve(&mut input, 0, 2).unwrap(),
            Curve::Bezier {
                cx1: 0.25,
                cy1: 0.0,
                cx2: 0.75,
                cy2: 1.0
            }
        );
        assert_eq!(read_curve(&mut input, 0, 2).unwrap(), Curve::Linear);
        assert_eq!(read_curve(&mut input, 0, 2).unwrap(), Curve::Linear);
        assert_eq!(input.remaining(), 0);

        // The final keyframe carries no curve byte.
        let cursor_before = input.cursor;
        assert_eq!(read_curve(&mut input, 1, 2).unwrap(), Curve::Linear);
        assert_eq!(input.cursor, cursor_before);
    }
}
