/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod mkcol;
mod propfind;
mod propertyupdate;
mod report;
