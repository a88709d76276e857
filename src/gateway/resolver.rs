//! Intent fields → ledger foreign keys.

use tally_core::{
    error::TallyError,
    intent::FinancialIntent,
    ledger::{Account, AccountKind},
    traits::CatalogRepo,
};
use tracing::debug;

/// Foreign keys picked for a transaction. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(super) struct Resolution {
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub account: Option<Account>,
}

/// Pick a category and an account for `intent`.
///
/// Category: exact (case-insensitive) name among the user's categories of the
/// same type, else the first one containing `misc_marker`.
/// Account: the kind preferred by the payment method, else the default account.
pub(super) async fn resolve(
    catalog: &dyn CatalogRepo,
    user_id: &str,
    intent: &FinancialIntent,
    misc_marker: &str,
) -> Result<Resolution, TallyError> {
    if !intent.kind.is_transaction() {
        return Ok(Resolution::default());
    }

    let category = match catalog
        .find_category(user_id, &intent.category, intent.kind)
        .await?
    {
        Some(c) => Some(c),
        None => {
            catalog
                .find_category_containing(user_id, misc_marker, intent.kind)
                .await?
        }
    };

    let preferred = match AccountKind::preferred_for(intent.payment_method) {
        Some(kind) => catalog.find_account_by_kind(user_id, kind).await?,
        None => None,
    };
    let account = match preferred {
        Some(a) => Some(a),
        None => catalog.find_default_account(user_id).await?,
    };

    debug!(
        "resolver: category={:?} account={:?}",
        category.as_ref().map(|c| &c.name),
        account.as_ref().map(|a| &a.name)
    );

    Ok(Resolution {
        category_id: category.as_ref().map(|c| c.id),
        category_name: category.map(|c| c.name),
        account,
    })
}
