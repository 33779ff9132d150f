//! Global id formatting.
//!
//! Devices, projects, streamers, variables and streams are addressed by
//! slugs built from hex groups of four digits joined with `-`, with the
//! entity prefix and the parts joined with `--`:
//!
//! ```text
//! device    d--0000-0000-0000-000a
//! project   p--0000-0001
//! streamer  t--0000-0000-0000-000a--0001
//! variable  v--0000-0001--5c00
//! stream    s--0000-0001--0000-0000-0000-000a--5c00
//! ```

fn hex_groups(value: u64, groups: usize) -> String {
    (0..groups)
        .rev()
        .map(|i| format!("{:04x}", (value >> (i * 16)) & 0xffff))
        .collect::<Vec<_>>()
        .join("-")
}

/// Four-group device id, e.g. `0000-0000-0000-000a`
pub fn device_gid(device_id: u64) -> String {
    hex_groups(device_id, 4)
}

/// Two-group project id, e.g. `0000-0001`
pub fn project_gid(project_id: u64) -> String {
    hex_groups(project_id, 2)
}

/// Single group variable id, e.g. `5c00`
pub fn variable_gid(vid: u16) -> String {
    hex_groups(u64::from(vid), 1)
}

pub fn device_slug(device_id: u64) -> String {
    format!("d--{}", device_gid(device_id))
}

pub fn project_slug(project_id: u64) -> String {
    format!("p--{}", project_gid(project_id))
}

pub fn streamer_slug(device_id: u64, index: u8) -> String {
    format!("t--{}--{}", device_gid(device_id), variable_gid(u16::from(index)))
}

pub fn variable_slug(project_id: u64, vid: u16) -> String {
    format!("v--{}--{}", project_gid(project_id), variable_gid(vid))
}

pub fn stream_slug(project_id: u64, device_id: u64, vid: u16) -> String {
    format!(
        "s--{}--{}--{}",
        project_gid(project_id),
        device_gid(device_id),
        variable_gid(vid)
    )
}

/// Extract the trailing variable id from a variable or stream slug
pub fn vid_from_slug(slug: &str) -> Option<u16> {
    let last = slug.rsplit("--").next()?;
    u16::from_str_radix(last, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_formats() {
        assert_eq!(device_slug(0xa), "d--0000-0000-0000-000a");
        assert_eq!(project_slug(1), "p--0000-0001");
        assert_eq!(streamer_slug(0xa, 1), "t--0000-0000-0000-000a--0001");
        assert_eq!(variable_slug(1, 0x5c00), "v--0000-0001--5c00");
        assert_eq!(
            stream_slug(1, 0xa, 0x5001),
            "s--0000-0001--0000-0000-0000-000a--5001"
        );
    }

    #[test]
    fn test_vid_from_slug() {
        assert_eq!(vid_from_slug("s--0000-0001--0000-0000-0000-000a--5c00"), Some(0x5c00));
        assert_eq!(vid_from_slug("v--0000-0001--5a05"), Some(0x5a05));
        assert_eq!(vid_from_slug("garbage--zz"), None);
    }
}
