//! Board lifecycle commands and the whole-board dense check.

use anyhow::{bail, Result};
use kb_reorder::{DenseReport, ParentId};
use serde_json::json;
use uuid::Uuid;

use super::Ctx;

pub async fn create(ctx: &Ctx, owner: &str, title: &str) -> Result<()> {
    let owner = owner.trim();
    let title = title.trim();
    if owner.is_empty() || title.is_empty() {
        bail!("--owner and --title must not be blank");
    }

    let row = kb_db::insert_board(
        &ctx.pool,
        &kb_db::NewBoard {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            title: title.to_string(),
        },
    )
    .await?;

    println!("board_id={}", row.id);
    println!("created_at_utc={}", row.created_at_utc.to_rfc3339());
    Ok(())
}

pub async fn list(ctx: &Ctx, owner: &str) -> Result<()> {
    let rows = kb_db::list_boards_by_owner(&ctx.pool, owner.trim()).await?;
    println!("boards={}", rows.len());
    for b in rows {
        println!(
            "board_id={} title={:?} created_at_utc={}",
            b.id,
            b.title,
            b.created_at_utc.to_rfc3339()
        );
    }
    Ok(())
}

/// Print the board tree (columns in order, each with its tasks in order).
pub async fn show(ctx: &Ctx, id: Uuid) -> Result<()> {
    let Some(board) = kb_db::fetch_board(&ctx.pool, id).await? else {
        bail!("board not found: {id}");
    };

    let mut columns = Vec::new();
    for col in ctx.columns.list(ParentId(id)).await? {
        let tasks: Vec<_> = ctx
            .tasks
            .list(col.id.into())
            .await?
            .into_iter()
            .map(|t| json!({ "id": t.id, "position": t.position, "content": t.body }))
            .collect();
        columns.push(json!({
            "id": col.id,
            "position": col.position,
            "title": col.body,
            "tasks": tasks,
        }));
    }

    let tree = json!({
        "board_id": board.id,
        "owner": board.owner,
        "title": board.title,
        "created_at_utc": board.created_at_utc,
        "columns": columns,
    });
    println!("{}", serde_json::to_string_pretty(&tree)?);
    Ok(())
}

pub async fn rename(ctx: &Ctx, id: Uuid, title: &str) -> Result<()> {
    let title = title.trim();
    if title.is_empty() {
        bail!("--title must not be blank");
    }
    match kb_db::rename_board(&ctx.pool, id, title).await? {
        Some(row) => println!("board_id={} title={:?}", row.id, row.title),
        None => bail!("board not found: {id}"),
    }
    Ok(())
}

pub async fn delete(ctx: &Ctx, id: Uuid) -> Result<()> {
    if !kb_db::delete_board(&ctx.pool, id).await? {
        bail!("board not found: {id}");
    }
    println!("board_id={id} deleted=true");
    Ok(())
}

/// Check the board's column positions and every column's task positions.
/// Fails when any parent is not dense.
pub async fn verify(ctx: &Ctx, id: Uuid) -> Result<()> {
    if kb_db::fetch_board(&ctx.pool, id).await?.is_none() {
        bail!("board not found: {id}");
    }

    let mut reports = vec![("board", ctx.columns.verify(ParentId(id)).await?)];
    for col in ctx.columns.list(ParentId(id)).await? {
        reports.push(("column", ctx.tasks.verify(col.id.into()).await?));
    }

    let mut violations = 0usize;
    for (kind, report) in &reports {
        print_report(kind, report);
        if report.violation.is_some() {
            violations += 1;
        }
    }

    println!("parents_checked={} violations={}", reports.len(), violations);
    if violations > 0 {
        bail!("DENSE_VIOLATION: {violations} parent(s) of board {id} are not dense");
    }
    Ok(())
}

fn print_report(kind: &str, r: &DenseReport) {
    match &r.violation {
        None => println!("{kind}={} count={} dense=true", r.parent, r.count),
        Some(v) => println!(
            "{kind}={} count={} dense=false violation={:?}",
            r.parent,
            r.count,
            v.to_string()
        ),
    }
}
