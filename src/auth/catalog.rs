//! 权限目录
//! 所有权限码的静态定义，按模块分组。路由守卫引用这里的常量，
//! 启动时同一份定义会同步到 modules / permissions 表。

/// 系统管理
pub mod system {
    pub const MODULE: &str = "system";
    pub const RBAC_ADMIN: &str = "system.rbac.admin";
}

/// 合同
pub mod contracts {
    pub const MODULE: &str = "contracts";
    pub const VIEW: &str = "contracts.view";
    pub const CREATE: &str = "contracts.create";
    pub const UPDATE: &str = "contracts.update";
    pub const DELETE: &str = "contracts.delete";
    pub const IMPORT: &str = "contracts.import";
}

/// 客户
pub mod customers {
    pub const MODULE: &str = "customers";
    pub const VIEW: &str = "customers.view";
    pub const CREATE: &str = "customers.create";
    pub const UPDATE: &str = "customers.update";
    pub const DELETE: &str = "customers.delete";
}

/// 员工
pub mod employees {
    pub const MODULE: &str = "employees";
    pub const VIEW: &str = "employees.view";
    pub const CREATE: &str = "employees.create";
    pub const UPDATE: &str = "employees.update";
    pub const DELETE: &str = "employees.delete";
}

/// 拥有全部权限的内置角色
pub const SYSTEM_ADMIN_ROLE: &str = "system-admin";

#[derive(Debug, Clone, Copy)]
pub struct PermissionDef {
    pub code: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ModuleDef {
    pub code: &'static str,
    pub name: &'static str,
    pub permissions: &'static [PermissionDef],
}

const fn perm(code: &'static str, name: &'static str) -> PermissionDef {
    PermissionDef { code, name }
}

/// 完整目录
pub const CATALOG: &[ModuleDef] = &[
    ModuleDef {
        code: contracts::MODULE,
        name: "Contracts",
        permissions: &[
            perm(contracts::VIEW, "View contracts"),
            perm(contracts::CREATE, "Create contracts"),
            perm(contracts::UPDATE, "Update contracts"),
            perm(contracts::DELETE, "Delete contracts"),
            perm(contracts::IMPORT, "Import contracts from spreadsheet"),
        ],
    },
    ModuleDef {
        code: customers::MODULE,
        name: "Customers",
        permissions: &[
            perm(customers::VIEW, "View customers"),
            perm(customers::CREATE, "Create customers"),
            perm(customers::UPDATE, "Update customers"),
            perm(customers::DELETE, "Delete customers"),
        ],
    },
    ModuleDef {
        code: employees::MODULE,
        name: "Employees",
        permissions: &[
            perm(employees::VIEW, "View employees"),
            perm(employees::CREATE, "Create employees"),
            perm(employees::UPDATE, "Update employees"),
            perm(employees::DELETE, "Delete employees"),
        ],
    },
    ModuleDef {
        code: system::MODULE,
        name: "System",
        permissions: &[perm(system::RBAC_ADMIN, "Manage roles and permissions")],
    },
];

/// 遍历全部权限码
pub fn all_permission_codes() -> impl Iterator<Item = &'static str> {
    CATALOG
        .iter()
        .flat_map(|m| m.permissions.iter().map(|p| p.code))
}

/// 查找权限所属模块
pub fn module_of(code: &str) -> Option<&'static ModuleDef> {
    CATALOG
        .iter()
        .find(|m| m.permissions.iter().any(|p| p.code == code))
}
