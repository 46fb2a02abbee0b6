//! In-memory book: account tree, transactions and prices

use std::collections::HashMap;

use gnc_rules_store::{BookRecords, Numeric, SplitUpdate};
use gnc_rules_utils::{join_account_path, split_account_path};

use crate::error::{CoreError, CoreResult};
use crate::models::{Account, Commodity, Split, Transaction};
use crate::prices::{Price, PriceDb};
use crate::types::{AccountId, CommodityId, TransactionId};

/// Book loaded from storage, with change tracking for splits
#[derive(Debug, Clone)]
pub struct Book {
    commodities: Vec<Commodity>,
    accounts: Vec<Account>,
    transactions: Vec<Transaction>,
    prices: PriceDb,
    root: AccountId,
    /// Splits changed since load, in change order
    modified: Vec<(TransactionId, usize)>,
}

impl Book {
    /// Build the book from raw records, resolving every guid reference
    pub fn from_records(records: BookRecords) -> CoreResult<Self> {
        let commodity_ids: HashMap<String, CommodityId> = records
            .commodities
            .iter()
            .enumerate()
            .map(|(i, c)| (c.guid.clone(), CommodityId(i)))
            .collect();
        let account_ids: HashMap<String, AccountId> = records
            .accounts
            .iter()
            .enumerate()
            .map(|(i, a)| (a.guid.clone(), AccountId(i)))
            .collect();

        let commodities = records
            .commodities
            .into_iter()
            .map(|c| Commodity {
                guid: c.guid,
                mnemonic: c.mnemonic,
                fraction: c.fraction,
            })
            .collect();

        let mut accounts = Vec::with_capacity(records.accounts.len());
        for record in &records.accounts {
            let commodity = match &record.commodity_guid {
                Some(guid) => Some(*commodity_ids.get(guid).ok_or_else(|| CoreError::InvalidFormat {
                    message: format!("account '{}' refers to unknown commodity {}", record.name, guid),
                })?),
                None => None,
            };
            let parent = match &record.parent_guid {
                Some(guid) => Some(*account_ids.get(guid).ok_or_else(|| CoreError::InvalidFormat {
                    message: format!("account '{}' refers to unknown parent {}", record.name, guid),
                })?),
                None => None,
            };
            accounts.push(Account {
                guid: record.guid.clone(),
                name: record.name.clone(),
                commodity,
                parent,
                children: Vec::new(),
                commodity_scu: record.commodity_scu,
                non_std_scu: record.non_std_scu,
            });
        }
        for i in 0..accounts.len() {
            if let Some(parent) = accounts[i].parent {
                accounts[parent.0].children.push(AccountId(i));
            }
        }

        let root = *account_ids
            .get(&records.root_account_guid)
            .ok_or_else(|| CoreError::InvalidFormat {
                message: format!("root account {} is missing", records.root_account_guid),
            })?;

        let mut transaction_ids = HashMap::with_capacity(records.transactions.len());
        let mut transactions = Vec::with_capacity(records.transactions.len());
        for record in records.transactions {
            let currency = *commodity_ids.get(&record.currency_guid).ok_or_else(|| CoreError::InvalidFormat {
                message: format!("transaction {} refers to unknown currency {}", record.guid, record.currency_guid),
            })?;
            transaction_ids.insert(record.guid.clone(), TransactionId(transactions.len()));
            transactions.push(Transaction {
                guid: record.guid,
                currency,
                num: record.num,
                post_date: record.post_date,
                enter_date: record.enter_date,
                description: record.description,
                splits: Vec::new(),
            });
        }

        for record in records.splits {
            let txn: TransactionId = *transaction_ids.get(&record.tx_guid).ok_or_else(|| CoreError::InvalidFormat {
                message: format!("split {} refers to unknown transaction {}", record.guid, record.tx_guid),
            })?;
            let account = *account_ids.get(&record.account_guid).ok_or_else(|| CoreError::InvalidFormat {
                message: format!("split {} refers to unknown account {}", record.guid, record.account_guid),
            })?;
            transactions[txn.0].splits.push(Split {
                guid: record.guid,
                account,
                value: record.value,
                quantity: record.quantity,
            });
        }

        let mut prices = Vec::with_capacity(records.prices.len());
        for record in records.prices {
            match (commodity_ids.get(&record.commodity_guid), commodity_ids.get(&record.currency_guid)) {
                (Some(&commodity), Some(&currency)) => prices.push(Price {
                    commodity,
                    currency,
                    time: record.date,
                    value: record.value,
                }),
                _ => log::warn!("Skipping price {} with an unknown commodity", record.guid),
            }
        }

        Ok(Self {
            commodities,
            accounts,
            transactions,
            prices: PriceDb::new(prices),
            root,
            modified: Vec::new(),
        })
    }

    pub fn root(&self) -> AccountId {
        self.root
    }

    pub fn account(&self, id: AccountId) -> &Account {
        &self.accounts[id.0]
    }

    pub fn commodity(&self, id: CommodityId) -> &Commodity {
        &self.commodities[id.0]
    }

    pub fn transaction(&self, id: TransactionId) -> &Transaction {
        &self.transactions[id.0]
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn price_db(&self) -> &PriceDb {
        &self.prices
    }

    /// Commodity of an account; only the root may lack one
    pub fn account_commodity(&self, id: AccountId) -> CoreResult<CommodityId> {
        self.account(id).commodity.ok_or_else(|| CoreError::MissingCommodity {
            account: self.full_name(id),
        })
    }

    /// Smallest unit amounts in the account are kept in: the account's own
    /// unit when it overrides its commodity, otherwise the commodity fraction
    pub fn account_scu(&self, id: AccountId) -> i64 {
        let account = self.account(id);
        match account.commodity {
            Some(commodity) if !account.non_std_scu => self.commodity(commodity).fraction,
            _ => account.commodity_scu,
        }
    }

    /// Colon-delimited path from below the root down to the account
    pub fn full_name(&self, id: AccountId) -> String {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(account_id) = current {
            let account = self.account(account_id);
            if account.is_root() {
                break;
            }
            names.push(account.name.as_str());
            current = account.parent;
        }
        names.reverse();
        join_account_path(&names)
    }

    /// Find a descendant of `parent` by name.
    ///
    /// Immediate children are searched first; failing that, each child's
    /// subtree is searched in child order.
    pub fn lookup_by_name(&self, parent: AccountId, name: &str) -> Option<AccountId> {
        let children = &self.account(parent).children;
        if let Some(&child) = children.iter().find(|&&c| self.account(c).name == name) {
            return Some(child);
        }
        children.iter().find_map(|&c| self.lookup_by_name(c, name))
    }

    /// Resolve a colon-delimited path from the root, one component at a time
    pub fn lookup_by_path(&self, path: &str) -> CoreResult<AccountId> {
        let mut current = self.root;
        for name in split_account_path(path) {
            current = self.lookup_by_name(current, name).ok_or_else(|| CoreError::AccountNotFound {
                path: path.to_string(),
            })?;
        }
        Ok(current)
    }

    /// Transactions with at least one split in `account`, in posting order
    pub fn transactions_for_account(&self, account: AccountId) -> Vec<TransactionId> {
        let mut ids: Vec<TransactionId> = self
            .transactions
            .iter()
            .enumerate()
            .filter(|(_, txn)| txn.involves_account(account))
            .map(|(i, _)| TransactionId(i))
            .collect();
        ids.sort_by(|a, b| {
            let (a, b) = (self.transaction(*a), self.transaction(*b));
            (a.post_date, &a.num, a.enter_date).cmp(&(b.post_date, &b.num, b.enter_date))
        });
        ids
    }

    pub fn is_split_imbalanced(&self, split: &Split) -> bool {
        self.account(split.account).is_imbalance()
    }

    /// Check if any split sits in an imbalance account
    pub fn is_imbalanced(&self, id: TransactionId) -> bool {
        self.transaction(id)
            .splits
            .iter()
            .any(|split| self.is_split_imbalanced(split))
    }

    /// Move a split to `account`, optionally replacing its quantity
    pub fn reassign_split(
        &mut self,
        txn: TransactionId,
        split_index: usize,
        account: AccountId,
        quantity: Option<Numeric>,
    ) {
        let split = &mut self.transactions[txn.0].splits[split_index];
        split.account = account;
        if let Some(quantity) = quantity {
            split.quantity = quantity;
        }
        if !self.modified.contains(&(txn, split_index)) {
            self.modified.push((txn, split_index));
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Split changes to persist, in change order
    pub fn pending_updates(&self) -> Vec<SplitUpdate> {
        self.modified
            .iter()
            .map(|&(txn, index)| {
                let split = &self.transaction(txn).splits[index];
                SplitUpdate {
                    split_guid: split.guid.clone(),
                    account_guid: self.account(split.account).guid.clone(),
                    quantity: split.quantity,
                }
            })
            .collect()
    }
}
