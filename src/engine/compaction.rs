use tokio::sync::oneshot;

use crate::model::*;

use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Compact the WAL by rewriting it with only the events needed to recreate
    /// the current state.
    ///
    /// Holds the commit gate exclusively for the whole snapshot and swap, so no
    /// operation can commit to the log being replaced.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;

        let mut resource_ids = self.store.resource_ids();
        resource_ids.sort();

        let mut events = Vec::new();
        for id in resource_ids {
            let Some(rs) = self.store.get_resource(&id) else {
                continue;
            };
            let guard = rs.read().await;
            let rows = self.store.reservations_of(&guard.reservation_ids);
            snapshot_resource(&guard, &rows, &mut events);
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Events recreating one resource and all of its reservations.
fn snapshot_resource(rs: &ResourceState, rows: &[Reservation], events: &mut Vec<Event>) {
    events.push(Event::ResourceCreated {
        id: rs.id,
        name: rs.name.clone(),
        description: rs.description.clone(),
        capacity: rs.capacity,
        active: rs.active,
        schedule: rs.schedule,
        created_at: rs.created_at,
    });

    let mut expired = Vec::new();
    for row in rows {
        // Settled rows no longer carry their deadline; any value works since
        // the status event that follows clears it again.
        events.push(Event::HoldPlaced {
            id: row.id,
            resource_id: rs.id,
            principal_id: row.principal_id,
            quantity: row.quantity,
            expires_at: row.expires_at.unwrap_or(row.created_at),
            created_at: row.created_at,
        });
        match row.status {
            ReservationStatus::Hold => {}
            ReservationStatus::Confirmed => events.push(Event::HoldConfirmed {
                id: row.id,
                resource_id: rs.id,
            }),
            ReservationStatus::Cancelled => events.push(Event::ReservationCancelled {
                id: row.id,
                resource_id: rs.id,
            }),
            ReservationStatus::Expired => expired.push(row.id),
        }
    }
    if !expired.is_empty() {
        events.push(Event::HoldsExpired { ids: expired });
    }
}

#[cfg(test)]
mod tests {
    use ulid::Ulid;

    use super::*;

    #[test]
    fn snapshot_replays_statuses() {
        let rs = ResourceState::new(Ulid::new(), ResourceSpec::with_capacity(10), 5);
        let row = |status, expires_at| Reservation {
            id: Ulid::new(),
            resource_id: rs.id,
            principal_id: Ulid::new(),
            status,
            quantity: 1,
            expires_at,
            created_at: 7,
        };
        let rows = vec![
            row(ReservationStatus::Hold, Some(900)),
            row(ReservationStatus::Confirmed, None),
            row(ReservationStatus::Expired, None),
            row(ReservationStatus::Expired, None),
        ];

        let mut events = Vec::new();
        snapshot_resource(&rs, &rows, &mut events);

        // create + 4 placements + 1 confirm + 1 expiry batch
        assert_eq!(events.len(), 7);
        assert!(matches!(events[0], Event::ResourceCreated { created_at: 5, .. }));
        assert!(matches!(events[1], Event::HoldPlaced { expires_at: 900, .. }));
        assert!(matches!(events[3], Event::HoldConfirmed { .. }));
        match events.last() {
            Some(Event::HoldsExpired { ids }) => assert_eq!(ids.len(), 2),
            other => panic!("expected expiry batch, got {other:?}"),
        }
    }
}
