use skel2d::{SkeletonData, Timeline};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let path = args.first().cloned().unwrap_or_else(|| {
        eprintln!("usage: skel_dump <skeleton.skel> [scale]");
        std::process::exit(2);
    });
    let scale: f32 = args
        .get(1)
        .map(|s| s.parse().expect("scale must be a float"))
        .unwrap_or(1.0);

    let name = std::path::Path::new(&path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("skeleton")
        .to_string();

    let bytes = std::fs::read(&path).expect("read skel");
    let data =
        SkeletonData::from_skel_bytes_with_scale(&bytes, &name, scale).expect("parse skel");

    println!(
        "{}: version {} size {}x{}",
        data.name,
        data.version.as_deref().unwrap_or("?"),
        data.width,
        data.height
    );

    println!("bones ({}):", data.bones.len());
    for bone in &data.bones {
        let parent = bone
            .parent
            .and_then(|i| data.bones.get(i))
            .map(|b| b.name.as_str())
            .unwrap_or("-");
        println!(
            "  {} parent={} pos=({}, {}) rot={} len={}",
            bone.name, parent, bone.x, bone.y, bone.rotation, bone.length
        );
    }

    println!("slots ({}):", data.slots.len());
    for slot in &data.slots {
        println!(
            "  {} bone={} attachment={}",
            slot.name,
            data.bones[slot.bone].name,
            slot.attachment.as_deref().unwrap_or("-")
        );
    }

    println!("skins ({}):", data.skins.len());
    for (i, skin) in data.skins.iter().enumerate() {
        let marker = if Some(i) == data.default_skin_index {
            " (default)"
        } else {
            ""
        };
        let count: usize = skin.attachments.iter().map(|m| m.len()).sum();
        println!("  {}{marker}: {count} attachments", skin.name);
    }

    if !data.events.is_empty() {
        println!("events ({}):", data.events.len());
        for event in &data.events {
            println!(
                "  {} int={} float={} string={}",
                event.name,
                event.int_value,
                event.float_value,
                event.string.as_deref().unwrap_or("-")
            );
        }
    }

    println!("animations ({}):", data.animations.len());
    for animation in &data.animations {
        println!(
            "  {}: {} timelines, {:.3}s",
            animation.name,
            animation.timelines.len(),
            animation.duration
        );
        for timeline in &animation.timelines {
            match timeline {
                Timeline::Rotate(t) => println!(
                    "    rotate {} ({} keys)",
                    data.bones[t.bone_index].name,
                    t.frames.len()
                ),
                Timeline::Translate(t) => println!(
                    "    translate {} ({} keys)",
                    data.bones[t.bone_index].name,
                    t.frames.len()
                ),
                Timeline::Scale(t) => println!(
                    "    scale {} ({} keys)",
                    data.bones[t.bone_index].name,
                    t.frames.len()
                ),
                Timeline::Color(t) => println!(
                    "    color {} ({} keys)",
                    data.slots[t.slot_index].name,
                    t.frames.len()
                ),
                Timeline::Attachment(t) => println!(
                    "    attachment {} ({} keys)",
                    data.slots[t.slot_index].name,
                    t.frames.len()
                ),
                Timeline::Deform(t) => println!(
                    "    deform {}/{} ({} keys)",
                    data.slots[t.slot_index].name,
                    t.attachment,
                    t.frames.len()
                ),
                Timeline::DrawOrder(t) => {
                    println!("    draw order ({} keys)", t.frames.len())
                }
                Timeline::Event(t) => println!("    events ({} keys)", t.events.len()),
            }
        }
    }
}
