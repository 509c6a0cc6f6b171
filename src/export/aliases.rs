use anyhow::Result;
use std::io::Write;

use crate::alias::Router;

/// Write inferred routers, one per line:
/// `R<n>: ip1 ip2 … ipN (method1, method2, …)`.
pub fn write_aliases<'a, W: Write>(
    routers: impl IntoIterator<Item = &'a Router>,
    mut writer: W,
) -> Result<()> {
    for (n, router) in routers.into_iter().enumerate() {
        let methods: Vec<&str> = router.methods().iter().map(|m| m.as_str()).collect();
        writeln!(writer, "R{}: {} ({})", n + 1, router, methods.join(", "))?;
    }
    Ok(())
}
