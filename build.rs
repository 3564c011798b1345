use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

// Directories holding the crate's own Rust sources. Anything else under the
// package root is not checked.
const SOURCE_DIRS: [&str; 6] = ["src", "forecast", "evaluate", "cli", "tests", "benches"];

// Words that may not appear in comments, matched case-sensitively.
const FORBIDDEN_COMMENT_WORDS: &str =
    "FIXED|CORRECTED|FIX|FIXES|NEW|CHANGED|CHANGES|CHANGE|MODIFIED|MODIFIES|MODIFY|UPDATED|UPDATES|UPDATE";

// One source policy: a line regex, a post-filter on the matched line, and the
// explanation printed when it is violated.
struct Rule {
    name: &'static str,
    pattern: String,
    accept: fn(&str) -> bool,
    advice: &'static str,
}

// Collects the offending lines of a single file.
struct LineCollector {
    accept: fn(&str) -> bool,
    violations: Vec<String>,
}

impl Sink for LineCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        if (self.accept)(line_text) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        // Keep searching the rest of the file.
        Ok(true)
    }
}

fn rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "underscore-prefixed variables",
            pattern: r"\b(_[a-zA-Z0-9_]+)\b".to_string(),
            accept: is_underscore_binding,
            advice: "Underscore-prefixed variable names are not allowed in this project.\n   \
                     Either use the variable (removing the underscore) or remove it completely.",
        },
        Rule {
            name: "forbidden comment words",
            pattern: format!(r"(//|/\*).*(?:{FORBIDDEN_COMMENT_WORDS})"),
            accept: |_| true,
            advice: "Comments narrating edits are not allowed. Remove them completely.",
        },
        Rule {
            name: "'**' in non-doc comments",
            pattern: r"(//|/\*).*\*\*".to_string(),
            accept: |line| !line.trim_start().starts_with("///"),
            advice: "The '**' pattern is only allowed in doc comments.",
        },
        Rule {
            name: "all-uppercase comments",
            pattern: r"(//|/\*).*".to_string(),
            accept: is_shouting_comment,
            advice: "Comments where all alphabetic characters are uppercase are not allowed.",
        },
        Rule {
            name: "#[allow(dead_code)] attributes",
            pattern: r"#\s*\[\s*allow\s*\(\s*dead_code\s*\)\s*\]".to_string(),
            accept: |_| true,
            advice: "Either use the code (removing the attribute) or remove it completely.",
        },
    ]
}

// Matches inside comments and string literals are not bindings.
fn is_underscore_binding(line: &str) -> bool {
    let is_pure_comment = line.trim_start().starts_with("//") || line.contains("/*");
    let is_in_string = line
        .split('"')
        .enumerate()
        .any(|(i, part)| i % 2 == 1 && part.contains('_'));
    !(is_pure_comment || is_in_string)
}

fn is_shouting_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    let comment = if let Some(rest) = trimmed.strip_prefix("///") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        rest
    } else if let Some(idx) = line.find("/*") {
        let rest = &line[idx + 2..];
        rest.find("*/").map_or(rest, |end| &rest[..end])
    } else {
        return false;
    };
    let alpha: Vec<char> = comment.chars().filter(|c| c.is_alphabetic()).collect();
    !alpha.is_empty() && alpha.iter().all(|c| c.is_uppercase())
}

fn rust_sources() -> Vec<PathBuf> {
    SOURCE_DIRS
        .into_iter()
        .filter(|dir| Path::new(dir).is_dir())
        .flat_map(|dir| WalkDir::new(dir).into_iter().filter_map(|e| e.ok()))
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
        .collect()
}

fn check_sources() -> Result<(), Box<dyn Error>> {
    let sources = rust_sources();
    let mut searcher = Searcher::new();

    for rule in rules() {
        let matcher = RegexMatcher::new_line_matcher(&rule.pattern)?;
        for path in &sources {
            let mut collector = LineCollector {
                accept: rule.accept,
                violations: Vec::new(),
            };
            searcher.search_path(&matcher, path, &mut collector)?;

            if !collector.violations.is_empty() {
                let mut error_msg = format!(
                    "\n❌ ERROR: Found {} {} in {}:\n",
                    collector.violations.len(),
                    rule.name,
                    path.display()
                );
                for violation in &collector.violations {
                    error_msg.push_str(&format!("   {violation}\n"));
                }
                error_msg.push_str(&format!("\n⚠️ {}\n", rule.advice));
                return Err(error_msg.into());
            }
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    for dir in SOURCE_DIRS {
        println!("cargo:rerun-if-changed={dir}");
    }

    if let Err(e) = check_sources() {
        // The `eprintln!` here is crucial for showing the error in `cargo`'s output.
        eprintln!("{e}");
        std::process::exit(1);
    }
}
