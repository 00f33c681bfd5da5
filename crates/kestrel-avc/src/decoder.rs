//! The decoder: parameter-set activation, access-unit assembly, the
//! per-picture decode loop and output delivery.

use crate::conceal::{Concealment, FrameCopyConcealment};
use crate::deblock::{deblock_picture, mbaff_post_process, DeblockParams};
use crate::dpb::Dpb;
use crate::error::{DecodeError, Result};
use crate::macroblock::Macroblock;
use crate::mb_read::SliceDecoder;
use crate::nal::{NalUnit, NalUnitType};
use crate::picture::Picture;
use crate::poc::PocContext;
use crate::pps::{parse_pps, Pps};
use crate::refs::{build_ref_lists, temporal_direct_scales, WeightTables};
use crate::sei::parse_sei_tone_mapping;
use crate::slice::{parse_slice_header, SliceHeader};
use crate::slice_group::SliceGroupMap;
use crate::sps::{parse_sps, parse_subset_sps, Sps, SubsetSps};
use crate::transform::EffectiveScalingLists;
use crate::bitreader::BitReader;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Pictures and advisory errors produced by one decoder call.
#[derive(Debug, Default)]
pub struct DecodeOutput {
    /// Output pictures in presentation (POC) order.
    pub pictures: Vec<Picture>,
    /// Non-fatal problems encountered; pictures may still be displayable.
    pub errors: Vec<DecodeError>,
}

/// Snapshot of the previous slice for access-unit boundary detection
/// (7.4.1.2.4).
#[derive(Debug, Clone)]
struct SliceSnapshot {
    first_mb: u32,
    pps_id: u8,
    frame_num: u32,
    field_pic_flag: bool,
    bottom_field_flag: bool,
    nal_ref_idc: u8,
    idr_flag: bool,
    idr_pic_id: u32,
    pic_order_cnt_lsb: u32,
    delta_pic_order_cnt_bottom: i32,
    delta_pic_order_cnt: [i32; 2],
    view_id: u16,
}

impl SliceSnapshot {
    fn of(header: &SliceHeader) -> Self {
        Self {
            first_mb: header.first_mb_in_slice,
            pps_id: header.pic_parameter_set_id,
            frame_num: header.frame_num,
            field_pic_flag: header.field_pic_flag,
            bottom_field_flag: header.bottom_field_flag,
            nal_ref_idc: header.nal_ref_idc,
            idr_flag: header.idr_flag,
            idr_pic_id: header.idr_pic_id,
            pic_order_cnt_lsb: header.pic_order_cnt_lsb,
            delta_pic_order_cnt_bottom: header.delta_pic_order_cnt_bottom,
            delta_pic_order_cnt: header.delta_pic_order_cnt,
            view_id: header.view_id,
        }
    }

    fn starts_new_picture(&self, header: &SliceHeader) -> bool {
        // A slice that does not advance first_mb_in_slice opens a picture.
        header.first_mb_in_slice <= self.first_mb
            || self.pps_id != header.pic_parameter_set_id
            || self.frame_num != header.frame_num
            || self.field_pic_flag != header.field_pic_flag
            || self.bottom_field_flag != header.bottom_field_flag
            || (self.nal_ref_idc == 0) != (header.nal_ref_idc == 0)
            || self.idr_flag != header.idr_flag
            || (header.idr_flag && self.idr_pic_id != header.idr_pic_id)
            || self.pic_order_cnt_lsb != header.pic_order_cnt_lsb
            || self.delta_pic_order_cnt_bottom != header.delta_pic_order_cnt_bottom
            || self.delta_pic_order_cnt != header.delta_pic_order_cnt
            || self.view_id != header.view_id
    }
}

/// The picture currently under construction.
struct CurrentPicture {
    pic: Picture,
    mbs: Vec<Macroblock>,
    deblock_params: Vec<DeblockParams>,
    group_map: SliceGroupMap,
    decoded_mbs: usize,
    slice_count: i32,
    /// Header of the first slice (drives reference marking).
    first_header: SliceHeader,
    layer: usize,
    mbaff: bool,
}

/// An H.264/AVC elementary-stream decoder.
pub struct Decoder {
    sps_map: HashMap<u8, Sps>,
    pps_map: HashMap<u8, Pps>,
    subset_sps_map: HashMap<u8, SubsetSps>,
    active_sps_id: Option<u8>,
    active_pps_id: Option<u8>,
    scaling: EffectiveScalingLists,

    poc: PocContext,
    dpb: [Dpb; 2],
    next_pic_id: i64,
    prev_frame_num: u32,

    cur: Option<CurrentPicture>,
    prev_slice: Option<SliceSnapshot>,

    concealment: Box<dyn Concealment + Send>,
    pending_tone_map: Option<Vec<u16>>,
    errors: Vec<DecodeError>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            sps_map: HashMap::new(),
            pps_map: HashMap::new(),
            subset_sps_map: HashMap::new(),
            active_sps_id: None,
            active_pps_id: None,
            scaling: EffectiveScalingLists::default(),
            poc: PocContext::new(),
            dpb: [Dpb::new(0), Dpb::new(1)],
            next_pic_id: 0,
            prev_frame_num: 0,
            cur: None,
            prev_slice: None,
            concealment: Box::new(FrameCopyConcealment),
            pending_tone_map: None,
            errors: Vec::new(),
        }
    }

    /// Replace the error-concealment policy.
    pub fn set_concealment(&mut self, policy: Box<dyn Concealment + Send>) {
        self.concealment = policy;
    }

    /// Decode one NAL unit. Returns the pictures it completed; fatal errors
    /// (invalid parameter sets, unsupported profiles) abort the session.
    pub fn decode_nal(&mut self, nal: &NalUnit) -> Result<DecodeOutput> {
        let mut pictures = Vec::new();
        let result = self.dispatch_nal(nal, &mut pictures);
        match result {
            Ok(()) => {}
            Err(err) => {
                let err = err.annotate(nal.nal_type() as u8, nal.offset, "decoder");
                if err.is_fatal() {
                    return Err(err);
                }
                self.errors.push(err);
            }
        }
        Ok(DecodeOutput {
            pictures,
            errors: std::mem::take(&mut self.errors),
        })
    }

    /// Decode a whole Annex B stream and flush.
    pub fn decode_annex_b(&mut self, data: &[u8]) -> Result<DecodeOutput> {
        let mut out = DecodeOutput::default();
        for nal in crate::nal::parse_annex_b(data)? {
            let mut part = self.decode_nal(&nal)?;
            out.pictures.append(&mut part.pictures);
            out.errors.append(&mut part.errors);
        }
        let mut tail = self.flush();
        out.pictures.append(&mut tail.pictures);
        out.errors.append(&mut tail.errors);
        Ok(out)
    }

    /// Finish the open picture (if any) and drain the DPBs.
    pub fn flush(&mut self) -> DecodeOutput {
        let mut pictures = Vec::new();
        if let Err(err) = self.exit_picture(&mut pictures) {
            self.errors.push(err);
        }
        for dpb in self.dpb.iter_mut() {
            dpb.flush(&mut pictures);
        }
        self.prev_slice = None;
        DecodeOutput {
            pictures,
            errors: std::mem::take(&mut self.errors),
        }
    }

    fn dispatch_nal(&mut self, nal: &NalUnit, pictures: &mut Vec<Picture>) -> Result<()> {
        match nal.nal_type() {
            NalUnitType::Sps => {
                let sps = parse_sps(&nal.payload)?;
                debug!(id = sps.seq_parameter_set_id, profile = %sps.profile_idc, "SPS");
                self.sps_map.insert(sps.seq_parameter_set_id, sps);
                Ok(())
            }
            NalUnitType::SubsetSps => {
                let subset = parse_subset_sps(&nal.payload)?;
                debug!(id = subset.sps.seq_parameter_set_id, "subset SPS");
                self.sps_map
                    .insert(subset.sps.seq_parameter_set_id, subset.sps.clone());
                self.subset_sps_map
                    .insert(subset.sps.seq_parameter_set_id, subset);
                Ok(())
            }
            NalUnitType::Pps => {
                let pps = parse_pps(&nal.payload, &self.sps_map)?;
                debug!(id = pps.pic_parameter_set_id, cabac = pps.is_cabac(), "PPS");
                self.pps_map.insert(pps.pic_parameter_set_id, pps);
                Ok(())
            }
            NalUnitType::Sei => {
                if let Some(tm) = parse_sei_tone_mapping(&nal.payload)? {
                    self.pending_tone_map = Some(tm.lut);
                }
                Ok(())
            }
            NalUnitType::NonIdrSlice
            | NalUnitType::IdrSlice
            | NalUnitType::SliceExtension
            | NalUnitType::SliceDataA => self.handle_slice(nal, pictures),
            NalUnitType::SliceDataB | NalUnitType::SliceDataC => {
                // Partitions B/C without their partition A are slice losses.
                Err(DecodeError::SliceLoss(
                    "orphan slice data partition".to_string(),
                ))
            }
            NalUnitType::EndOfSequence | NalUnitType::EndOfStream => {
                self.exit_picture(pictures)?;
                for dpb in self.dpb.iter_mut() {
                    dpb.flush(pictures);
                }
                Ok(())
            }
            NalUnitType::Aud
            | NalUnitType::FillerData
            | NalUnitType::PrefixNal
            | NalUnitType::Vdrd
            | NalUnitType::SpsExtension => Ok(()),
            other => {
                trace!(?other, "ignoring NAL unit");
                Ok(())
            }
        }
    }

    fn handle_slice(&mut self, nal: &NalUnit, pictures: &mut Vec<Picture>) -> Result<()> {
        let mut reader = BitReader::new(&nal.payload);
        let header = parse_slice_header(&mut reader, &self.sps_map, &self.pps_map, nal)?;
        let header_end_bits = reader.bit_position();

        // Redundant coded slices are dropped when the primary decoded.
        if header.redundant_pic_cnt != 0 {
            trace!("dropping redundant slice");
            return Ok(());
        }

        let new_picture = match (&self.prev_slice, &self.cur) {
            (Some(prev), Some(_)) => prev.starts_new_picture(&header),
            _ => true,
        };
        if new_picture {
            self.exit_picture(pictures)?;
            self.init_picture(&header, pictures)?;
        }
        self.prev_slice = Some(SliceSnapshot::of(&header));

        let cur = self.cur.as_mut().ok_or_else(|| {
            DecodeError::SliceLoss("slice without an open picture".to_string())
        })?;
        let pps = &self.pps_map[&header.pic_parameter_set_id];
        let sps = &self.sps_map[&pps.seq_parameter_set_id];

        // Reference lists, weights and direct-mode scales for this slice.
        let layer = cur.layer;
        let base = (layer == 1).then(|| &self.dpb[0]);
        let lists = build_ref_lists(&self.dpb[layer], base, &header, sps, cur.pic.poc)?;
        let weights = WeightTables::build(&header, &lists, pps.weighted_bipred_idc, cur.pic.poc);
        let direct_scales = temporal_direct_scales(&lists, cur.pic.poc);

        let slice_nr = cur.slice_count;
        cur.slice_count += 1;
        cur.deblock_params.push(DeblockParams {
            disable_idc: header.disable_deblocking_filter_idc,
            alpha_offset: header.filter_offset_a(),
            beta_offset: header.filter_offset_b(),
            chroma_qp_offset: [
                pps.chroma_qp_index_offset,
                pps.second_chroma_qp_index_offset,
            ],
        });

        let mbaff_scale = 1 + cur.mbaff as u32;
        let first_mb = header.first_mb_in_slice * mbaff_scale;
        if (first_mb as usize) >= cur.mbs.len() {
            return Err(DecodeError::SyntaxViolation(format!(
                "first_mb_in_slice {} outside the picture",
                header.first_mb_in_slice
            )));
        }

        let mut slice = SliceDecoder::new(
            header,
            sps,
            pps,
            &nal.payload,
            header_end_bits,
            lists,
            weights,
            direct_scales,
            slice_nr,
            &self.scaling,
        )?;

        let mut addr = first_mb;
        loop {
            slice
                .decode_macroblock(&mut cur.mbs, &mut cur.pic, &self.dpb[layer], addr)
                .map_err(|e| e.annotate(nal.nal_type() as u8, nal.offset, "macroblock"))?;
            cur.decoded_mbs += 1;

            // MBAFF visits pairs top-then-bottom; the slice-group scan
            // already assigns both members of a pair to one group.
            let next = if cur.mbaff && addr % 2 == 0 {
                Some(addr + 1)
            } else {
                cur.group_map.next_mb(addr)
            };

            match next {
                Some(a) if (a as usize) < cur.mbs.len() => {
                    if slice.end_of_slice()? {
                        break;
                    }
                    addr = a;
                }
                _ => {
                    // Picture complete; consume the closing end-of-slice.
                    let _ = slice.end_of_slice();
                    break;
                }
            }
        }

        trace!(
            slice = slice_nr,
            decoded = cur.decoded_mbs,
            total = cur.mbs.len(),
            "slice done"
        );
        Ok(())
    }

    fn init_picture(&mut self, header: &SliceHeader, pictures: &mut Vec<Picture>) -> Result<()> {
        let pps = self
            .pps_map
            .get(&header.pic_parameter_set_id)
            .ok_or_else(|| {
                DecodeError::InvalidParameterSet(format!(
                    "PPS {} not found",
                    header.pic_parameter_set_id
                ))
            })?
            .clone();
        let sps = self
            .sps_map
            .get(&pps.seq_parameter_set_id)
            .ok_or_else(|| {
                DecodeError::InvalidParameterSet(format!("SPS {} not found", pps.seq_parameter_set_id))
            })?
            .clone();

        let layer = if header.nal_unit_type == NalUnitType::SliceExtension as u8
            && header.view_id != 0
        {
            1usize
        } else {
            0
        };

        // Activation: a changed SPS reallocates the DPB after a flush.
        if self.active_sps_id != Some(sps.seq_parameter_set_id) || !self.dpb[layer].is_initialized()
        {
            debug!(id = sps.seq_parameter_set_id, "activating SPS");
            if self.dpb[layer].is_initialized() {
                self.dpb[layer].flush(pictures);
            }
            self.dpb[layer].init(&sps);
            self.active_sps_id = Some(sps.seq_parameter_set_id);
            self.poc = PocContext::new();
        }
        if self.active_pps_id != Some(pps.pic_parameter_set_id) {
            self.active_pps_id = Some(pps.pic_parameter_set_id);
        }
        self.scaling = EffectiveScalingLists::derive(
            sps.seq_scaling_matrix_present_flag,
            &sps.scaling_lists,
            pps.pic_scaling_matrix_present_flag,
            &pps.scaling_lists,
        );

        // frame_num gap handling.
        if !header.idr_flag
            && header.frame_num != self.prev_frame_num
            && header.frame_num != (self.prev_frame_num + 1) % sps.max_frame_num()
        {
            if sps.gaps_in_frame_num_value_allowed_flag {
                let poc_hint = self.poc.clone().compute(&sps, header).frame_poc;
                self.dpb[layer].fill_frame_num_gap(
                    &sps,
                    self.prev_frame_num,
                    header.frame_num,
                    poc_hint,
                    pictures,
                    &mut self.next_pic_id,
                )?;
            } else {
                self.errors.push(DecodeError::SliceLoss(format!(
                    "frame_num jumped from {} to {}",
                    self.prev_frame_num, header.frame_num
                )));
            }
        }
        if header.nal_ref_idc != 0 {
            self.prev_frame_num = header.frame_num;
        }

        let poc = self.poc.compute(&sps, header);

        let structure = header.structure();
        let mut pic = Picture::alloc(self.next_pic_id, &sps, structure);
        self.next_pic_id += 1;
        pic.top_poc = poc.top_field_order_cnt;
        pic.bottom_poc = poc.bottom_field_order_cnt;
        pic.frame_poc = poc.frame_poc;
        pic.poc = poc.pic_order_cnt;
        pic.frame_num = header.frame_num;
        pic.pic_num = header.curr_pic_num(&sps) as i32;
        pic.used_for_reference = header.nal_ref_idc != 0;
        pic.idr_flag = header.idr_flag;
        pic.slice_type = header.slice_type;
        pic.mb_aff_frame_flag = header.mbaff_frame_flag(&sps);
        pic.view_id = header.view_id;
        pic.inter_view_flag = header.inter_view_flag;
        pic.anchor_pic_flag = header.anchor_pic_flag;
        pic.layer_id = layer as u8;
        pic.qp = header.slice_qp(&sps, &pps)?;
        pic.slice_qp_delta = header.slice_qp_delta;
        pic.chroma_qp_offset = [
            pps.chroma_qp_index_offset,
            pps.second_chroma_qp_index_offset,
        ];
        pic.tone_mapping_lut = self.pending_tone_map.take();

        let pic_size_in_mbs = header.pic_size_in_mbs(&sps) as usize;
        let width_mbs = sps.pic_width_in_mbs();
        let mbs = (0..pic_size_in_mbs as u32)
            .map(|addr| Macroblock::new(addr, width_mbs))
            .collect();

        let group_map = SliceGroupMap::build(&sps, &pps, header);

        debug!(
            poc = pic.poc,
            frame_num = pic.frame_num,
            layer,
            "picture started"
        );
        self.cur = Some(CurrentPicture {
            pic,
            mbs,
            deblock_params: Vec::new(),
            group_map,
            decoded_mbs: 0,
            slice_count: 0,
            first_header: header.clone(),
            layer,
            mbaff: header.mbaff_frame_flag(&sps),
        });
        Ok(())
    }

    /// Finish the current picture: concealment, deblocking, MBAFF
    /// post-processing, padding and DPB storage.
    fn exit_picture(&mut self, pictures: &mut Vec<Picture>) -> Result<()> {
        let Some(mut cur) = self.cur.take() else {
            return Ok(());
        };

        // Slice-loss hook: undecoded macroblocks go to the concealment
        // policy.
        if cur.decoded_mbs < cur.mbs.len() {
            self.errors.push(DecodeError::SliceLoss(format!(
                "{} of {} macroblocks missing",
                cur.mbs.len() - cur.decoded_mbs,
                cur.mbs.len()
            )));
            self.concealment
                .conceal(&mut cur.pic, &mut cur.mbs, &self.dpb[cur.layer]);
            // Concealed MBs need filter parameters.
            cur.deblock_params.push(DeblockParams::default());
            let synth = cur.deblock_params.len() - 1;
            for mb in cur.mbs.iter_mut() {
                if mb.slice_nr == i32::MAX - 1 {
                    mb.slice_nr = synth as i32;
                }
            }
        }

        // Record field decoding flags for the MBAFF post-pass and reference
        // motion handling.
        for (addr, flags) in cur.pic.mb_field_flags.iter_mut().enumerate() {
            if let Some(mb) = cur.mbs.get(addr) {
                *flags = mb.mb_field;
            }
        }

        let width_mbs = (cur.pic.width() / 16).max(1);
        deblock_picture(&mut cur.pic, &cur.mbs, &cur.deblock_params, width_mbs);
        if cur.mbaff {
            mbaff_post_process(&mut cur.pic, width_mbs);
        }

        if cur.pic.used_for_reference || cur.pic.inter_view_flag {
            cur.pic.pad();
        }

        let marking = cur.first_header.dec_ref_pic_marking.clone();
        let layer = cur.layer;
        debug!(poc = cur.pic.poc, layer, "picture complete");
        self.dpb[layer].store_picture(cur.pic, &marking, pictures, &mut self.next_pic_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    fn sps_nal() -> Vec<u8> {
        // Baseline, level 3.0, one 16x16 MB, 4:2:0 8-bit, poc type 0.
        let mut w = BitWriter::new();
        w.bits(66, 8); // profile_idc
        w.bits(0, 8); // constraint flags + reserved
        w.bits(30, 8); // level_idc
        w.ue(0); // seq_parameter_set_id
        w.ue(0); // log2_max_frame_num_minus4
        w.ue(0); // pic_order_cnt_type
        w.ue(0); // log2_max_pic_order_cnt_lsb_minus4
        w.ue(2); // max_num_ref_frames
        w.bit(false); // gaps_in_frame_num_value_allowed_flag
        w.ue(0); // pic_width_in_mbs_minus1
        w.ue(0); // pic_height_in_map_units_minus1
        w.bit(true); // frame_mbs_only_flag
        w.bit(true); // direct_8x8_inference_flag
        w.bit(false); // frame_cropping_flag
        w.bit(false); // vui_parameters_present_flag
        w.rbsp_trailing();
        let mut nal = vec![0x67];
        nal.extend(w.into_bytes());
        nal
    }

    fn pps_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        w.ue(0); // pic_parameter_set_id
        w.ue(0); // seq_parameter_set_id
        w.bit(false); // entropy_coding_mode_flag
        w.bit(false); // bottom_field_pic_order
        w.ue(0); // num_slice_groups_minus1
        w.ue(0); // num_ref_idx_l0_default_active_minus1
        w.ue(0); // num_ref_idx_l1_default_active_minus1
        w.bit(false); // weighted_pred_flag
        w.bits(0, 2); // weighted_bipred_idc
        w.se(14); // pic_init_qp_minus26 -> 40
        w.se(0); // pic_init_qs_minus26
        w.se(0); // chroma_qp_index_offset
        w.bit(true); // deblocking_filter_control_present_flag
        w.bit(false); // constrained_intra_pred_flag
        w.bit(false); // redundant_pic_cnt_present_flag
        w.rbsp_trailing();
        let mut nal = vec![0x68];
        nal.extend(w.into_bytes());
        nal
    }

    /// The scenario-1 IDR slice: one I_16x16 DC macroblock whose luma DC
    /// level pulls every sample to zero at QP 40.
    fn idr_slice_nal() -> Vec<u8> {
        let mut w = BitWriter::new();
        // slice header
        w.ue(0); // first_mb_in_slice
        w.ue(7); // slice_type I (fixed for the picture)
        w.ue(0); // pic_parameter_set_id
        w.bits(0, 4); // frame_num
        w.ue(0); // idr_pic_id
        w.bits(0, 4); // pic_order_cnt_lsb
        w.bit(false); // no_output_of_prior_pics_flag
        w.bit(false); // long_term_reference_flag
        w.se(0); // slice_qp_delta
        w.ue(1); // disable_deblocking_filter_idc
        // slice data: mb_type 3 = I_16x16_2_0_0 (DC, cbp 0)
        w.ue(3);
        w.ue(0); // intra_chroma_pred_mode DC
        w.se(0); // mb_qp_delta
        // luma DC block: coeff_token TC1 T1_0, then level -32 via the
        // escape code (prefix 15, suffix 31 decodes to -31, sign-adjusted
        // to -32), then total_zeros 0.
        w.bits(0b000101, 6);
        w.bits(0, 15); // level_prefix 15
        w.bit(true);
        w.bits(31, 12); // level_suffix
        w.bit(true); // total_zeros 0
        w.rbsp_trailing();
        let mut nal = vec![0x65];
        nal.extend(w.into_bytes());
        nal
    }

    #[test]
    fn test_parameter_set_round_trip() {
        let mut dec = Decoder::new();
        let sps = crate::nal::parse_nal_unit(&sps_nal(), 0).unwrap();
        let out = dec.decode_nal(&sps).unwrap();
        assert!(out.pictures.is_empty());
        assert!(out.errors.is_empty());
        let pps = crate::nal::parse_nal_unit(&pps_nal(), 0).unwrap();
        dec.decode_nal(&pps).unwrap();
        assert!(dec.sps_map.contains_key(&0));
        assert!(dec.pps_map.contains_key(&0));
    }

    #[test]
    fn test_slice_without_pps_is_fatal() {
        let mut dec = Decoder::new();
        let nal = crate::nal::parse_nal_unit(&idr_slice_nal(), 0).unwrap();
        let err = dec.decode_nal(&nal).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_nal_ignored() {
        let mut dec = Decoder::new();
        let nal = crate::nal::parse_nal_unit(&[0x09, 0x10], 0).unwrap(); // AUD
        let out = dec.decode_nal(&nal).unwrap();
        assert!(out.pictures.is_empty());
        assert!(out.errors.is_empty());
    }
}
