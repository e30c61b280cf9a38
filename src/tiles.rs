use crate::{
    ledger::Ledger,
    parser::parse_tile,
    snapshot::{
        GameSnapshot,
        TileDetail,
    },
};
use futures::future::join_all;
use tracing::{
    debug,
    warn,
};

/// Reads every tile listed in `snapshot`. Tiles that cannot be read or parsed
/// are skipped; the rest keep the snapshot's order.
pub async fn fetch_tile_details(ledger: &dyn Ledger, snapshot: &GameSnapshot) -> Vec<TileDetail> {
    let reads = snapshot.tile_ids.iter().enumerate().map(|(idx, id)| async move {
        let fallback = snapshot.tile_positions.get(idx).copied();
        match ledger.get_object(id).await {
            Ok(Some(raw)) => parse_tile(&raw.content, fallback),
            Ok(None) => {
                debug!(tile = %id, "tile no longer exists");
                None
            }
            Err(err) => {
                warn!(tile = %id, ?err, "tile fetch failed");
                None
            }
        }
    });
    join_all(reads).await.into_iter().flatten().collect()
}
