//! Column and task commands. Both collections go through the same engine
//! calls; only the nouns differ.

use anyhow::{bail, Result};
use kb_reorder::{Collection, ItemId, MoveTarget, NewItem, ParentId, PlacedItem};
use uuid::Uuid;

use super::Ctx;

/// Append a column to a board or a task to a column.
pub async fn add(ctx: &Ctx, collection: Collection, parent: Uuid, body: &str) -> Result<()> {
    let body = body.trim();
    if body.is_empty() {
        match collection {
            Collection::Columns => bail!("--title must not be blank"),
            Collection::Tasks => bail!("--content must not be blank"),
        }
    }

    let placed = ctx
        .engine(collection)
        .append(ParentId(parent), NewItem::new(body))
        .await?;
    print_placed(collection, &placed);
    Ok(())
}

pub async fn move_to(ctx: &Ctx, collection: Collection, id: Uuid, target: MoveTarget) -> Result<()> {
    let placed = ctx.engine(collection).move_item(ItemId(id), target).await?;
    print_placed(collection, &placed);
    Ok(())
}

pub async fn remove(ctx: &Ctx, collection: Collection, id: Uuid) -> Result<()> {
    let vacated = ctx.engine(collection).remove(ItemId(id)).await?;
    println!(
        "{}_id={} removed=true {}_id={} vacated_position={}",
        collection.item_noun(),
        vacated.id,
        collection.parent_noun(),
        vacated.parent,
        vacated.position
    );
    Ok(())
}

fn print_placed(collection: Collection, p: &PlacedItem) {
    println!(
        "{}_id={} {}_id={} position={}",
        collection.item_noun(),
        p.id,
        collection.parent_noun(),
        p.parent,
        p.position
    );
}
