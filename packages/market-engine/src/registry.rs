//! Asset definitions and the instance registry.

use market_types::{AssetId, AssetStatus, InstanceId, InstanceStatus, UserId};
use tracing::info;

use crate::events::{EventKind, NewEvent, Notification, NotificationKind};
use crate::market::Market;
use crate::models::{AssetDefinition, Instance, NewAsset, Page, Paged, RelatedType};
use crate::store::Tables;
use crate::MarketError;

const MAX_NAME_LEN: usize = 100;
const MAX_SUPPLY: u32 = 10_000;

impl Tables {
    pub(crate) fn asset(&self, asset_id: AssetId) -> Result<&AssetDefinition, MarketError> {
        self.assets
            .get(&asset_id)
            .ok_or_else(|| MarketError::asset_not_found(asset_id))
    }

    pub(crate) fn instance(&self, instance_id: InstanceId) -> Result<&Instance, MarketError> {
        self.instances
            .get(&instance_id)
            .ok_or_else(|| MarketError::instance_not_found(instance_id))
    }

    /// Compare-and-set on the instance status.
    pub(crate) fn set_instance_status(
        &mut self,
        instance_id: InstanceId,
        expected: InstanceStatus,
        next: InstanceStatus,
    ) -> Result<(), MarketError> {
        let now = self.now;
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or_else(|| MarketError::instance_not_found(instance_id))?;
        if instance.status != expected {
            return Err(MarketError::ConcurrentModification(format!(
                "Instance #{instance_id} is {}, expected {expected}",
                instance.status
            )));
        }
        instance.status = next;
        instance.updated_at = now;
        Ok(())
    }

    pub(crate) fn transfer_ownership(
        &mut self,
        instance_id: InstanceId,
        new_owner: UserId,
    ) -> Result<(), MarketError> {
        let now = self.now;
        let instance = self
            .instances
            .get_mut(&instance_id)
            .ok_or_else(|| MarketError::instance_not_found(instance_id))?;
        if instance.status == InstanceStatus::Burned {
            return Err(MarketError::InvalidState(format!(
                "Instance #{instance_id} is burned"
            )));
        }
        instance.owner_id = new_owner;
        instance.updated_at = now;
        Ok(())
    }

    /// Serials continue from the asset's `minted_count`.
    pub(crate) fn mint(
        &mut self,
        asset_id: AssetId,
        target: UserId,
        count: u32,
    ) -> Result<Vec<Instance>, MarketError> {
        let now = self.now;
        let asset = self
            .assets
            .get_mut(&asset_id)
            .ok_or_else(|| MarketError::asset_not_found(asset_id))?;
        if asset.status != AssetStatus::Active {
            return Err(MarketError::InvalidState(format!(
                "Asset #{asset_id} is {}, only active assets can be minted",
                asset.status
            )));
        }
        if count == 0 {
            return Err(MarketError::InvalidInput("mint count must be at least 1".into()));
        }
        let remaining = asset.total_supply - asset.minted_count;
        if count > remaining {
            return Err(MarketError::InvalidState(format!(
                "Asset #{asset_id} has {remaining} of {} left to mint",
                asset.total_supply
            )));
        }
        let first_serial = asset.minted_count + 1;
        asset.minted_count += count;

        let mut minted = Vec::with_capacity(count as usize);
        for serial in first_serial..first_serial + count {
            let instance = Instance {
                id: self.next_instance_id(),
                asset_id,
                serial,
                token_id: format!("tk-{asset_id}-{serial}-{}", uuid::Uuid::new_v4().simple()),
                owner_id: target,
                status: InstanceStatus::InWallet,
                created_at: now,
                updated_at: now,
            };
            self.instances.insert(instance.id, instance.clone());
            minted.push(instance);
        }
        Ok(minted)
    }
}

impl Market {
    /// The creator must already hold a points account.
    pub fn submit_asset(
        &self,
        creator_id: UserId,
        new: NewAsset,
    ) -> Result<AssetDefinition, MarketError> {
        let name = new.name.trim();
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(MarketError::InvalidInput(format!(
                "Asset name must be 1-{MAX_NAME_LEN} characters"
            )));
        }
        if new.total_supply == 0 || new.total_supply > MAX_SUPPLY {
            return Err(MarketError::InvalidInput(format!(
                "Total supply must be between 1 and {MAX_SUPPLY}"
            )));
        }
        let asset = self.store.transaction(self.now(), |t| {
            // Royalties are credited here on every resale.
            t.account(creator_id)?;
            let asset = AssetDefinition {
                id: t.next_asset_id(),
                creator_id,
                name: name.to_string(),
                description: new.description.clone(),
                media_url: new.media_url.clone(),
                total_supply: new.total_supply,
                minted_count: 0,
                status: AssetStatus::PendingReview,
                created_at: t.now,
            };
            t.assets.insert(asset.id, asset.clone());
            Ok(asset)
        })?;
        info!(asset_id = asset.id, creator_id, "Asset submitted for review");
        Ok(asset)
    }

    /// Approval activates the asset and mints its whole supply to the creator.
    pub fn review_asset(
        &self,
        asset_id: AssetId,
        approve: bool,
    ) -> Result<AssetDefinition, MarketError> {
        let now = self.now();
        let (asset, minted) = self.store.transaction(now, |t| {
            let asset = t
                .assets
                .get_mut(&asset_id)
                .ok_or_else(|| MarketError::asset_not_found(asset_id))?;
            if asset.status != AssetStatus::PendingReview {
                return Err(MarketError::InvalidState(format!(
                    "Asset #{asset_id} was already reviewed"
                )));
            }
            if !approve {
                asset.status = AssetStatus::Rejected;
                return Ok((asset.clone(), 0));
            }
            asset.status = AssetStatus::Active;
            let (creator, supply) = (asset.creator_id, asset.total_supply);
            let minted = t.mint(asset_id, creator, supply)?;
            Ok((t.asset(asset_id)?.clone(), minted.len()))
        })?;

        info!(asset_id, approve, minted, "Asset reviewed");
        if minted > 0 {
            self.emit(NewEvent {
                kind: EventKind::Mint,
                user_id: asset.creator_id,
                description: format!("Minted {minted} copies of \"{}\"", asset.name),
                related: Some((RelatedType::Asset, asset_id)),
                at: now,
            });
        }
        let (title, content) = if approve {
            ("Creation approved", format!("\"{}\" was approved and minted to you", asset.name))
        } else {
            ("Creation rejected", format!("\"{}\" was not approved", asset.name))
        };
        self.notify(Notification::new(
            asset.creator_id,
            NotificationKind::Asset,
            title,
            content,
            asset_id,
        ));
        Ok(asset)
    }

    pub fn mint_instances(
        &self,
        asset_id: AssetId,
        target: UserId,
        count: u32,
    ) -> Result<Vec<Instance>, MarketError> {
        let now = self.now();
        let minted = self
            .store
            .transaction(now, |t| t.mint(asset_id, target, count))?;
        info!(asset_id, target, count, "Instances minted");
        self.emit(NewEvent {
            kind: EventKind::Mint,
            user_id: target,
            description: format!("Minted {count} copies of asset #{asset_id}"),
            related: Some((RelatedType::Asset, asset_id)),
            at: now,
        });
        Ok(minted)
    }

    pub fn asset(&self, asset_id: AssetId) -> Result<AssetDefinition, MarketError> {
        self.store.read(|t| t.asset(asset_id).cloned())
    }

    pub fn instance(&self, instance_id: InstanceId) -> Result<Instance, MarketError> {
        self.store.read(|t| t.instance(instance_id).cloned())
    }

    /// Guarded status change; fails with `ConcurrentModification` if the stored
    /// status is not `expected`.
    pub fn set_instance_status(
        &self,
        instance_id: InstanceId,
        expected: InstanceStatus,
        next: InstanceStatus,
    ) -> Result<Instance, MarketError> {
        self.store.transaction(self.now(), |t| {
            t.set_instance_status(instance_id, expected, next)?;
            t.instance(instance_id).cloned()
        })
    }

    pub fn instances_owned_by(&self, owner_id: UserId, page: Page) -> Paged<Instance> {
        self.store.read(|t| {
            page.paginate(t.instances.values().filter(|i| {
                i.owner_id == owner_id && i.status != InstanceStatus::Burned
            }))
        })
    }

    /// Owner-only and only while the instance sits in the wallet. Terminal.
    pub fn burn_instance(
        &self,
        instance_id: InstanceId,
        owner_id: UserId,
    ) -> Result<Instance, MarketError> {
        let now = self.now();
        let instance = self.store.transaction(now, |t| {
            let instance = t.instance(instance_id)?;
            if instance.owner_id != owner_id {
                return Err(MarketError::NotOwner(format!(
                    "You do not own instance #{instance_id}"
                )));
            }
            if instance.status != InstanceStatus::InWallet {
                return Err(MarketError::InvalidState(format!(
                    "Instance #{instance_id} is {}, only in_wallet items can be burned",
                    instance.status
                )));
            }
            t.set_instance_status(instance_id, InstanceStatus::InWallet, InstanceStatus::Burned)?;
            t.instance(instance_id).cloned()
        })?;
        info!(instance_id, owner_id, "Instance burned");
        self.emit(NewEvent {
            kind: EventKind::Burn,
            user_id: owner_id,
            description: format!("Burned {}", instance.token_id),
            related: Some((RelatedType::Instance, instance_id)),
            at: now,
        });
        Ok(instance)
    }
}
