use std::path::Path;

/// How a language names its test files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestNaming {
    /// `test_{stem}.{ext}`
    Prefix(&'static str),
    /// `{stem}{suffix}.{ext}`
    Suffix(&'static str),
    /// `{Stem}{suffix}.{ext}`, stem capitalized
    ClassSuffix(&'static str),
}

#[derive(Debug, PartialEq, Eq)]
pub struct Language {
    pub name: &'static str,
    /// Framework suggested to the model unless overridden in config.
    pub framework: &'static str,
    naming: TestNaming,
}

impl Language {
    /// Test file name for a source file `{stem}.{ext}`.
    pub fn test_file_name(&self, stem: &str, ext: &str) -> String {
        match self.naming {
            TestNaming::Prefix(prefix) => format!("{prefix}{stem}.{ext}"),
            TestNaming::Suffix(suffix) => format!("{stem}{suffix}.{ext}"),
            TestNaming::ClassSuffix(suffix) => {
                let mut chars = stem.chars();
                let class = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                };
                format!("{class}{suffix}.{ext}")
            }
        }
    }
}

static PYTHON: Language = Language {
    name: "python",
    framework: "pytest",
    naming: TestNaming::Prefix("test_"),
};
static JAVASCRIPT: Language = Language {
    name: "javascript",
    framework: "jest",
    naming: TestNaming::Suffix(".test"),
};
static TYPESCRIPT: Language = Language {
    name: "typescript",
    framework: "jest",
    naming: TestNaming::Suffix(".test"),
};
static GO: Language = Language {
    name: "go",
    framework: "testing",
    naming: TestNaming::Suffix("_test"),
};
static RUST: Language = Language {
    name: "rust",
    framework: "built-in #[test]",
    naming: TestNaming::Suffix("_test"),
};
static JAVA: Language = Language {
    name: "java",
    framework: "JUnit 5",
    naming: TestNaming::ClassSuffix("Test"),
};
static KOTLIN: Language = Language {
    name: "kotlin",
    framework: "JUnit 5",
    naming: TestNaming::ClassSuffix("Test"),
};
static CSHARP: Language = Language {
    name: "csharp",
    framework: "xUnit",
    naming: TestNaming::ClassSuffix("Tests"),
};
static RUBY: Language = Language {
    name: "ruby",
    framework: "RSpec",
    naming: TestNaming::Suffix("_spec"),
};
static PHP: Language = Language {
    name: "php",
    framework: "PHPUnit",
    naming: TestNaming::ClassSuffix("Test"),
};
static SWIFT: Language = Language {
    name: "swift",
    framework: "XCTest",
    naming: TestNaming::ClassSuffix("Tests"),
};
static C: Language = Language {
    name: "c",
    framework: "Unity",
    naming: TestNaming::Prefix("test_"),
};
static CPP: Language = Language {
    name: "cpp",
    framework: "GoogleTest",
    naming: TestNaming::Prefix("test_"),
};

/// Language of a source file, by extension. Each extension maps to exactly
/// one language; `.h` is treated as C.
pub fn language_for(path: &Path) -> Option<&'static Language> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "py" => &PYTHON,
        "js" | "jsx" | "mjs" | "cjs" => &JAVASCRIPT,
        "ts" | "tsx" => &TYPESCRIPT,
        "go" => &GO,
        "rs" => &RUST,
        "java" => &JAVA,
        "kt" => &KOTLIN,
        "cs" => &CSHARP,
        "rb" => &RUBY,
        "php" => &PHP,
        "swift" => &SWIFT,
        "c" | "h" => &C,
        "cpp" | "cc" | "cxx" | "hpp" => &CPP,
        _ => return None,
    };
    Some(lang)
}

/// Whether `path` already looks like a test file.
pub fn is_test_file(path: &Path) -> bool {
    let in_test_dir = path.parent().is_some_and(|parent| {
        parent.components().any(|c| {
            matches!(
                c.as_os_str().to_str(),
                Some("test" | "tests" | "__tests__" | "spec" | "testing")
            )
        })
    });
    if in_test_dir {
        return true;
    }

    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    stem.starts_with("test_")
        || stem.ends_with("_test")
        || stem.ends_with("_spec")
        || stem.ends_with(".test")
        || stem.ends_with(".spec")
        || stem.ends_with("Test")
        || stem.ends_with("Tests")
}
