//! Template generation for `jsconfig init`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::file::CONFIG_FILE_NAME;

/// Template jsconfig.toml with documentation
pub const JSCONFIG_TOML_TEMPLATE: &str = r#"# jsconfig.toml - settings for building s-*.json files from s-*.js modules
#
# `jsconfig build` turns every s-*.js config module into s-*.json next to it.
# `jsconfig convert` does the reverse. Command-line flags override this file.

[output]
# Spaces per indentation level. 0 writes compact single-line JSON.
# Default: 2
# spaces = 2

# Indent with tabs instead of spaces. Wins over `spaces`.
# Default: false
# tabs = false

# Replace output files that already exist.
# Default: false
# overwrite = false

# Take the indentation from .editorconfig when neither this file nor the
# command line sets it.
# Default: false
# use_editorconfig = false

[discovery]
# Directory names skipped during the search, on top of
# .git, _meta, node_modules and plugins.
# exclude = ["dist"]

# Also skip files matched by .gitignore.
# Default: false
# respect_gitignore = false

[modules]
# How s-*.js modules are evaluated by `jsconfig build`:
#   "auto"   - run them with Node.js when it is on PATH, else "static"
#   "node"   - always run them with Node.js
#   "static" - never execute them; supports literals, require of
#              relative files, process.env and simple expressions
# Default: "auto"
# engine = "auto"

# Node.js binary to use, a name looked up on PATH or a path.
# node = "node"
"#;

/// Write jsconfig.toml into `dir`.
///
/// Returns an error if the file already exists.
pub fn generate_init_file(dir: &Path) -> io::Result<PathBuf> {
    let path = dir.join(CONFIG_FILE_NAME);

    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{CONFIG_FILE_NAME} already exists"),
        ));
    }

    fs::write(&path, JSCONFIG_TOML_TEMPLATE)?;
    Ok(path)
}
