//! Role checks for group operations.
//!
//! Every check takes the group as currently stored, so callers must hold the
//! group's lock between the check and the write.

use uuid::Uuid;

use crate::error::{KinshipError, KinshipResult};
use crate::models::{Group, GroupMember, GroupRole};

/// The actor must be a member.
pub fn require_member(group: &Group, player: Uuid) -> KinshipResult<&GroupMember> {
    group
        .member(player)
        .ok_or_else(|| KinshipError::forbidden("You are not a member of this group"))
}

/// The actor must be a member holding at least `required`.
pub fn require_role(
    group: &Group,
    player: Uuid,
    required: GroupRole,
) -> KinshipResult<&GroupMember> {
    let member = require_member(group, player)?;
    if !member.role.at_least(required) {
        return Err(KinshipError::forbidden(format!(
            "This requires the {required} role or higher"
        )));
    }
    Ok(member)
}

/// The actor must hold at least `required` and strictly outrank the target.
///
/// Returns the actor and target members.
pub fn require_authority<'g>(
    group: &'g Group,
    actor: Uuid,
    target: Uuid,
    required: GroupRole,
) -> KinshipResult<(&'g GroupMember, &'g GroupMember)> {
    let acting = require_role(group, actor, required)?;
    let target = group
        .member(target)
        .ok_or_else(|| KinshipError::not_found("Group member"))?;
    if !acting.role.outranks(target.role) {
        return Err(KinshipError::forbidden(format!(
            "You cannot act on a member with the {} role",
            target.role
        )));
    }
    Ok((acting, target))
}

/// Minimum role allowed to invite: the configured role, raised to ADMIN
/// when the group has invites switched off.
pub fn invite_role(group: &Group, configured: GroupRole) -> GroupRole {
    if group.settings.allow_invites || configured.at_least(GroupRole::Admin) {
        configured
    } else {
        GroupRole::Admin
    }
}
