use crate::context::NetContext;
use crate::dns::DnsReconciler;
use crate::error::Result;
use crate::output::UserOutput;
use crate::proxy::ProxyReconciler;

/// Tear a project down: the inverse of `up`. DNS records go first, then
/// proxy routes, then the port allocation.
pub async fn run_down(ctx: &NetContext, project: &str, out: &dyn UserOutput) -> Result<()> {
    out.status(&format!("Taking '{}' offline...", project));

    out.progress("  dns        ");
    let dns_warnings = DnsReconciler::new(ctx).remove(project).await?;
    out.finish_progress("records removed");
    for warning in &dns_warnings {
        out.warning(&format!("  warning: {}", warning));
    }

    out.progress("  proxy      ");
    let proxy_warnings = ProxyReconciler::new(ctx).remove(project).await?;
    out.finish_progress("routes removed");
    for warning in &proxy_warnings {
        out.warning(&format!("  warning: {}", warning));
    }

    out.progress("  ports      ");
    let released = ctx.ledger().release(project)?;
    out.finish_progress(if released {
        "released"
    } else {
        "nothing allocated"
    });

    out.blank();
    out.success(&format!("'{}' is offline", project));
    Ok(())
}
