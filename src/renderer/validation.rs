//! WGSL validation using the naga library.

use anyhow::{Context, Result, anyhow};

/// Parse WGSL source code using naga's front-end.
///
/// # Returns
/// The parsed naga Module on success, or an error with the numbered source on failure.
pub fn validate_wgsl(source: &str) -> Result<naga::Module> {
    naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow!("WGSL validation failed:\n{}", format_naga_error(source, &e.to_string())))
}

/// Parse WGSL and provide context about which stage generated it.
pub fn validate_wgsl_with_context(source: &str, context: &str) -> Result<naga::Module> {
    validate_wgsl(source).with_context(|| format!("{} generated invalid WGSL", context))
}

/// Parse and fully validate a WGSL module (types, bindings, entry point IO).
///
/// This is the compile step every generated program goes through before it can
/// be installed on a render target.
pub fn compile_wgsl(source: &str) -> Result<(naga::Module, naga::valid::ModuleInfo)> {
    let module = validate_wgsl(source)?;
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| {
        anyhow!(
            "WGSL module validation failed:\n{}",
            format_naga_error(source, &format!("{e:?}"))
        )
    })?;
    Ok((module, info))
}

/// Format a naga error with the numbered source for easier debugging.
fn format_naga_error(source: &str, message: &str) -> String {
    let mut output = String::new();

    output.push_str(&format!("  {}\n", message));
    output.push_str("\nGenerated WGSL:\n");
    output.push_str("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");

    output
}
