use crate::tenancy::ResourceKind;

const TENANTS: &str = r#"CREATE TABLE IF NOT EXISTS tenants (
    id UUID PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    domain TEXT UNIQUE,
    status TEXT NOT NULL DEFAULT 'active',
    features JSONB NOT NULL DEFAULT '[]'::jsonb,
    limits JSONB NOT NULL DEFAULT '{}'::jsonb,
    branding JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

const TENANT_USAGE: &str = r#"CREATE TABLE IF NOT EXISTS tenant_usage (
    tenant_id UUID NOT NULL REFERENCES tenants(id),
    resource_kind TEXT NOT NULL,
    current_count BIGINT NOT NULL DEFAULT 0 CHECK (current_count >= 0),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (tenant_id, resource_kind)
)"#;

/// Columns specific to each resource table
fn columns(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Users => "email TEXT NOT NULL, name TEXT, role TEXT",
        ResourceKind::Activities => "actor_id TEXT, action TEXT NOT NULL, subject TEXT",
        ResourceKind::Polls => "title TEXT NOT NULL, options JSONB, created_by TEXT, group_id TEXT",
        ResourceKind::Jobs => "title TEXT NOT NULL, location TEXT, employment_type TEXT, salary BIGINT, posted_by TEXT",
        ResourceKind::Groups => "name TEXT NOT NULL, description TEXT, owner_id TEXT, members JSONB DEFAULT '[]'::jsonb",
        ResourceKind::Presentations => "title TEXT NOT NULL, owner_id TEXT, slides JSONB",
        ResourceKind::TrainingCourses => "title TEXT NOT NULL, description TEXT, instructor_id TEXT",
        ResourceKind::TrainingSessions => "course_id TEXT, starts_at TIMESTAMPTZ, location TEXT",
        ResourceKind::TrainingModules => "course_id TEXT, title TEXT NOT NULL, position INTEGER",
        ResourceKind::Assessments => "module_id TEXT, title TEXT NOT NULL, passing_score INTEGER",
    }
}

/// DDL for every table, in dependency order
pub fn statements() -> Vec<String> {
    let mut statements = vec![TENANTS.to_string(), TENANT_USAGE.to_string()];

    for kind in ResourceKind::ALL {
        let table = kind.table_name();
        let unique: String = kind
            .unique_fields()
            .iter()
            .map(|field| format!(", UNIQUE (tenant_id, {})", field))
            .collect();

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\
             id TEXT PRIMARY KEY, \
             tenant_id UUID NOT NULL REFERENCES tenants(id), \
             {columns}, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
             updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
             {unique})",
            table = table,
            columns = columns(kind),
            unique = unique,
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS \"{table}_tenant_idx\" ON \"{table}\" (tenant_id)",
            table = table
        ));
    }

    statements
}
