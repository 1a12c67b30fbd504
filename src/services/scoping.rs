//! Division scoping rules that gate each transaction type.
//!
//! Pure: callers resolve the locations first and pass them in. Admins are
//! never scoped.

use uuid::Uuid;

use crate::auth::{Caller, Role};
use crate::entities::{LocationKind, TxnType};
use crate::errors::ServiceError;
use crate::services::directory::LocationRef;

pub const NO_DIVISION: &str = "account not assigned to a division";
pub const ROLE_NOT_PERMITTED: &str = "forbidden: role not permitted for this transaction type";
pub const OUT_OF_DIVISION: &str = "forbidden: location out of your division";
pub const LOCATION_WITHOUT_DIVISION: &str = "location missing division assignment";
pub const DESTINATION_NOT_WAREHOUSE: &str = "destination must be a warehouse location";
pub const DESTINATION_SAME_DIVISION: &str = "destination must be in another division";

/// Decide whether `caller` may perform `txn_type` between the resolved
/// source and destination.
pub fn authorize(
    caller: &Caller,
    txn_type: TxnType,
    src: Option<&LocationRef>,
    dst: Option<&LocationRef>,
) -> Result<(), ServiceError> {
    if caller.is_admin() {
        return Ok(());
    }

    let division = caller
        .division_id
        .ok_or_else(|| ServiceError::Forbidden(NO_DIVISION.to_string()))?;

    if txn_type.is_manager_only() && caller.role != Role::Manager {
        return Err(ServiceError::Forbidden(ROLE_NOT_PERMITTED.to_string()));
    }

    match txn_type {
        TxnType::Receive | TxnType::ProjectReturn => {
            in_division(division, side(dst, "dstLocationId")?)
        }
        TxnType::Ship | TxnType::ProjectIssue => in_division(division, side(src, "srcLocationId")?),
        TxnType::Transfer => {
            in_division(division, side(src, "srcLocationId")?)?;
            in_division(division, side(dst, "dstLocationId")?)
        }
        TxnType::DivisionTransfer => {
            in_division(division, side(src, "srcLocationId")?)?;
            let dst = side(dst, "dstLocationId")?;
            if dst.kind != LocationKind::Warehouse {
                return Err(ServiceError::ValidationError(
                    DESTINATION_NOT_WAREHOUSE.to_string(),
                ));
            }
            if division_of(dst)? == division {
                return Err(ServiceError::ValidationError(
                    DESTINATION_SAME_DIVISION.to_string(),
                ));
            }
            Ok(())
        }
    }
}

fn side<'a>(loc: Option<&'a LocationRef>, field: &str) -> Result<&'a LocationRef, ServiceError> {
    loc.ok_or_else(|| {
        ServiceError::ValidationError(format!("{field} required for this transaction type"))
    })
}

fn division_of(loc: &LocationRef) -> Result<Uuid, ServiceError> {
    loc.division_id
        .ok_or_else(|| ServiceError::ValidationError(LOCATION_WITHOUT_DIVISION.to_string()))
}

fn in_division(division: Uuid, loc: &LocationRef) -> Result<(), ServiceError> {
    if division_of(loc)? != division {
        return Err(ServiceError::Forbidden(OUT_OF_DIVISION.to_string()));
    }
    Ok(())
}
