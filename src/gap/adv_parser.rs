use heapless::String;

use super::ad_type;

/// Iterate over the `(ad_type, data)` structures of a raw advertising report.
///
/// Stops at the first zero-length or truncated structure.
pub fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let item = (data[i + 1], &data[i + 2..i + 1 + len]);
        i += len + 1;
        Some(item)
    })
}

/// Check if raw advertisement data lists the given 16-bit service UUID
/// (complete or incomplete list).
pub fn contains_service_uuid16(data: &[u8], uuid: u16) -> bool {
    let uuid_le = uuid.to_le_bytes();

    ad_structures(data)
        .filter(|(t, _)| {
            *t == ad_type::INCOMPLETE_UUID16_LIST || *t == ad_type::COMPLETE_UUID16_LIST
        })
        .any(|(_, uuids)| uuids.chunks_exact(2).any(|chunk| chunk == uuid_le))
}

/// Extract complete/shortened local name from advertisement data.
pub fn extract_device_name(data: &[u8]) -> String<32> {
    let found = ad_structures(data).find(|(t, _)| {
        *t == ad_type::SHORTENED_LOCAL_NAME || *t == ad_type::COMPLETE_LOCAL_NAME
    });

    let mut name = String::new();
    match found {
        Some((_, name_bytes)) => {
            for &b in name_bytes {
                if name.push(b as char).is_err() {
                    break;
                }
            }
        }
        None => {
            let _ = name.push_str("Unknown");
        }
    }
    name
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
