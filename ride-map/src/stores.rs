use ride_map_model::{Address, Coordinate, UpdateKind};

/// The origin or destination the rider is choosing. Every change bumps `revision`, which lets an
/// async lookup notice the coordinate moved while it was waiting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CoordinateStore {
    coords: Option<Coordinate>,
    kind: UpdateKind,
    revision: u64,
    address: Option<Address>,
}

impl CoordinateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coords(&self) -> Option<Coordinate> {
        self.coords
    }

    pub fn kind(&self) -> UpdateKind {
        self.kind
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn change(&mut self, coords: Coordinate, kind: UpdateKind) {
        self.coords = Some(coords);
        self.kind = kind;
        self.revision += 1;
        // Described a place we're no longer at
        self.address = None;
    }

    /// Records a looked-up address, unless the coordinate changed since `revision`.
    pub fn set_address(&mut self, revision: u64, address: Address) -> bool {
        if revision != self.revision {
            return false;
        }
        self.address = Some(address);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_address_is_dropped() {
        let mut store = CoordinateStore::new();
        let here = Coordinate::new(41.3, 69.2);
        store.change(here, UpdateKind::Provisional);
        let asked_at = store.revision();

        store.change(Coordinate::new(41.31, 69.2), UpdateKind::Final);
        let address = Address {
            name: "Old place".to_string(),
            coordinate: here,
        };
        assert!(!store.set_address(asked_at, address.clone()));
        assert_eq!(store.address(), None);

        assert!(store.set_address(store.revision(), address.clone()));
        assert_eq!(store.address(), Some(&address));
        assert_eq!(store.kind(), UpdateKind::Final);
    }
}
