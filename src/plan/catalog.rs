//! Static lookup tables used when building plans.
//!
//! Every lookup is case-insensitive on the tool name.

/// Base tools that must be installed before the named tool
const BASE_TOOL_DEPENDENCIES: &[(&str, &[&str])] = &[
    ("Docker", &["curl"]),
    ("Jupyter", &["Python"]),
    ("Terraform", &["curl"]),
    ("Google Cloud SDK", &["curl"]),
    ("Azure CLI", &["curl"]),
];

const EDITOR_HOSTS: &[&str] = &["VS Code", "Cursor"];

/// Editor extensions that need a host editor in the plan
const EXTENSION_HOSTS: &[(&str, &[&str])] = &[
    ("GitHub Copilot", EDITOR_HOSTS),
    ("Python Extension", EDITOR_HOSTS),
    ("Jupyter Extension", EDITOR_HOSTS),
    ("REST Client", EDITOR_HOSTS),
    ("YAML Extension", EDITOR_HOSTS),
    ("Markdownlint", EDITOR_HOSTS),
];

const JUSTIFICATIONS: &[(&str, &str)] = &[
    ("Python", "Essential for Python development, data science, and AI/ML workflows"),
    ("Node.js", "Required for JavaScript/TypeScript development and npm packages"),
    ("Git", "Version control system essential for collaborative development"),
    ("Docker", "Containerization platform for consistent development environments"),
    ("VS Code", "Popular code editor with extensive extension ecosystem"),
    ("Cursor", "AI-powered code editor optimized for AI/ML development"),
    ("Jupyter", "Interactive computing environment for data science and ML"),
    ("Postman", "API development and testing tool"),
    ("Terraform", "Infrastructure as Code tool for cloud resource management"),
    ("AWS CLI", "Command line interface for AWS services"),
    ("Google Cloud SDK", "Command line tools for Google Cloud Platform"),
    ("Azure CLI", "Command line interface for Microsoft Azure"),
    ("GitHub Copilot", "AI-powered code completion and pair programming"),
    ("Python Extension", "Enhanced Python development support in VS Code"),
    ("Jupyter Extension", "Jupyter notebook support in VS Code"),
    ("REST Client", "HTTP client for testing APIs directly in VS Code"),
    ("YAML Extension", "YAML language support and validation"),
    ("Markdownlint", "Markdown linting and formatting"),
];

const BASE_CONFIDENCE: &[(&str, f64)] = &[
    ("Python", 0.95),
    ("Node.js", 0.9),
    ("Git", 0.95),
    ("Docker", 0.85),
    ("VS Code", 0.9),
    ("Cursor", 0.8),
    ("Jupyter", 0.85),
    ("Postman", 0.8),
    ("Terraform", 0.75),
    ("AWS CLI", 0.8),
    ("Google Cloud SDK", 0.75),
    ("Azure CLI", 0.75),
];

pub const FALLBACK_CONFIDENCE: f64 = 0.7;
pub const PORTAL_CONFIDENCE: f64 = 0.9;

/// A tool the catalog knows how to install without asking an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownTool {
    /// Canonical display name
    pub name: &'static str,
    /// Extra spellings accepted on the command line
    pub aliases: &'static [&'static str],
    /// Package name handed to the system package manager
    pub package: &'static str,
    pub check_command: &'static str,
}

pub const KNOWN_TOOLS: &[KnownTool] = &[
    KnownTool {
        name: "Git",
        aliases: &[],
        package: "git",
        check_command: "git --version",
    },
    KnownTool {
        name: "curl",
        aliases: &[],
        package: "curl",
        check_command: "curl --version",
    },
    KnownTool {
        name: "Python",
        aliases: &["python3"],
        package: "python3",
        check_command: "python3 --version",
    },
    KnownTool {
        name: "Node.js",
        aliases: &["node", "nodejs"],
        package: "nodejs",
        check_command: "node --version",
    },
    KnownTool {
        name: "Docker",
        aliases: &[],
        package: "docker.io",
        check_command: "docker --version",
    },
    KnownTool {
        name: "Jupyter",
        aliases: &[],
        package: "jupyter-notebook",
        check_command: "jupyter --version",
    },
    KnownTool {
        name: "VS Code",
        aliases: &["vscode", "code"],
        package: "code",
        check_command: "code --version",
    },
    KnownTool {
        name: "Java",
        aliases: &["openjdk"],
        package: "default-jdk",
        check_command: "java -version",
    },
    KnownTool {
        name: "gcc",
        aliases: &[],
        package: "gcc",
        check_command: "gcc --version",
    },
    KnownTool {
        name: "make",
        aliases: &[],
        package: "make",
        check_command: "make --version",
    },
    KnownTool {
        name: "Terraform",
        aliases: &[],
        package: "terraform",
        check_command: "terraform --version",
    },
    KnownTool {
        name: "AWS CLI",
        aliases: &["awscli", "aws"],
        package: "awscli",
        check_command: "aws --version",
    },
];

/// Named tool bundles accepted by `--preset`
pub const PRESETS: &[(&str, &[&str])] = &[
    ("web_development", &["Git", "Node.js", "VS Code", "Docker"]),
    ("python_development", &["Git", "Python", "VS Code", "Jupyter"]),
    ("ai_development", &["Git", "Python", "Jupyter", "Docker", "VS Code"]),
    ("mobile_development", &["Git", "Node.js", "Java", "VS Code"]),
];

fn lookup<'a, T>(table: &'a [(&'static str, T)], name: &str) -> Option<&'a T> {
    let name = name.trim();
    table
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

/// Base tools the named tool needs installed first
pub fn base_dependencies(name: &str) -> &'static [&'static str] {
    lookup(BASE_TOOL_DEPENDENCIES, name).copied().unwrap_or(&[])
}

/// Host editors the named extension can be installed into
pub fn extension_hosts(name: &str) -> &'static [&'static str] {
    lookup(EXTENSION_HOSTS, name).copied().unwrap_or(&[])
}

pub fn justification(name: &str) -> String {
    lookup(JUSTIFICATIONS, name)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("Required for {} development workflow", name))
}

pub fn base_confidence(name: &str) -> f64 {
    lookup(BASE_CONFIDENCE, name)
        .copied()
        .unwrap_or(FALLBACK_CONFIDENCE)
}

/// Resolve a name or alias to a catalog entry
pub fn known_tool(name: &str) -> Option<&'static KnownTool> {
    let name = name.trim();
    KNOWN_TOOLS.iter().find(|tool| {
        tool.name.eq_ignore_ascii_case(name)
            || tool.package.eq_ignore_ascii_case(name)
            || tool.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    })
}

pub fn preset(name: &str) -> Option<&'static [&'static str]> {
    lookup(PRESETS, name).copied()
}

pub fn preset_names() -> impl Iterator<Item = &'static str> {
    PRESETS.iter().map(|(name, _)| *name)
}
