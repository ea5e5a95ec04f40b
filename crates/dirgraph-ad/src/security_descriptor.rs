//! Security descriptor to ACE rows.

use dirgraph_connector::security::{RawAce, SecurityDescriptor};
use dirgraph_db::CreateAce;

/// Flatten one descriptor's DACL into rows, in DACL order.
///
/// `ace_order` is the entry's position in the source DACL, so the orders of
/// one object always form `0..n`. An absent descriptor, an absent DACL and
/// an empty DACL all yield nothing.
pub fn normalize(descriptor: Option<&SecurityDescriptor>) -> impl Iterator<Item = CreateAce> + '_ {
    descriptor.into_iter().flat_map(|sd| {
        sd.dacl
            .iter()
            .flatten()
            .enumerate()
            .map(move |(position, ace)| ace_row(sd, position, ace))
    })
}

fn ace_row(sd: &SecurityDescriptor, position: usize, ace: &RawAce) -> CreateAce {
    let object_specific = ace.ace_type.is_object_specific();
    CreateAce {
        object_dn: sd.object_dn.clone(),
        object_guid: sd.object_guid.clone(),
        object_sid: sd.object_sid.clone(),
        object_cn: sd.object_cn.clone(),
        ace_order: position as i32,
        ace_type: ace.ace_type.name(),
        ace_flags: i32::from(ace.flags),
        access_mask: i64::from(ace.mask),
        object_type: ace.object_type.filter(|_| object_specific),
        inherited_object_type: ace.inherited_object_type.filter(|_| object_specific),
        trustee_sid: ace.sid.clone(),
        sd_control: i32::from(sd.control),
    }
}
