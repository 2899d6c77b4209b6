use serde::{Deserialize, Serialize};

/// The kind of principal a permission entry applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Profile,
    PermissionSet,
}

/// A named security principal referenced by a permission entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPrincipal {
    pub name: String,
    pub kind: PrincipalKind,
}

/// Read/edit access to one field for one principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPermission {
    pub read: bool,
    pub edit: bool,
}

/// Object-level CRUD access for one principal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectCrud {
    pub create: bool,
    pub read: bool,
    pub edit: bool,
    pub delete: bool,
}

/// One field's permission for one principal. Flattened into a list rather
/// than a nested map so the shape serializes the same way whether there
/// are zero, one, or many principals per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPermissionEntry {
    pub field_name: String,
    pub principal: SecurityPrincipal,
    pub permission: FieldPermission,
}

/// One principal's object-level CRUD entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectCrudEntry {
    pub principal: SecurityPrincipal,
    pub crud: ObjectCrud,
}

/// Per-field and object-level security for one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityBlock {
    pub field_permissions: Vec<FieldPermissionEntry>,
    pub object_crud: Vec<ObjectCrudEntry>,
}

/// A tenant-global profile, referenced by [`SecurityPrincipal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub label: String,
}

/// A tenant-global permission set, referenced by [`SecurityPrincipal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionSet {
    pub name: String,
    pub label: String,
}

/// A tenant-global role, referenced by security metadata and org-wide
/// security listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_role: Option<String>,
}

/// The tenant-global security entities enumerated once per run by
/// `OrgSecurityEnricher`, shared by reference across every
/// object's `SecurityBlock`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgSecurityModel {
    pub profiles: Vec<Profile>,
    pub permission_sets: Vec<PermissionSet>,
    pub roles: Vec<Role>,
}
